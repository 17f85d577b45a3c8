//! Typed payloads for the LMS REST boundary.
//!
//! Upstream responses are duck-typed JSON; these structs validate the fields
//! the pipeline actually relies on at the boundary and carry everything else
//! as explicit optionals.

use serde::{Deserialize, Serialize};

use crate::matcher::Named;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub syllabus_body: Option<String>,
}

impl Named for Course {
    #[inline]
    fn match_name(&self) -> &str {
        &self.name
    }
}

/// One navigation tab of a course, as returned by the tabs endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub id: String,
    pub label: String,
    pub html_url: String,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub hidden: Option<bool>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

impl Tab {
    /// Tabs hidden from students are skipped during navigation discovery.
    #[inline]
    pub fn is_visible(&self) -> bool {
        !self.hidden.unwrap_or(false)
    }
}

/// Summary entry from the course pages listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    /// URL slug of the page, e.g. `syllabus`
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Full page payload including the HTML body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBody {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: i64,
    pub display_name: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(rename = "content-type", default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub due_at: Option<String>,
}
