
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::lms::LmsClient;

/// Endpoints probed for every course, with the cheap request issued for each.
pub const PROBED_ENDPOINTS: [(&str, &str); 7] = [
    ("pages", "courses/{id}/pages?per_page=1"),
    ("files", "courses/{id}/files?per_page=1"),
    ("modules", "courses/{id}/modules?per_page=1"),
    ("assignments", "courses/{id}/assignments?per_page=1"),
    ("discussions", "courses/{id}/discussion_topics?per_page=1"),
    (
        "announcements",
        "courses/{id}/discussion_topics?only_announcements=true&per_page=1",
    ),
    ("tabs", "courses/{id}/tabs"),
];

/// Result of probing one endpoint. Never persisted on its own; lives inside
/// the aggregate below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointProbe {
    pub name: String,
    pub path: String,
    pub available: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// One probe run for one course. Superseded wholesale by the next run;
/// cached by the orchestrator as part of the course content index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseApiAvailability {
    pub course_id: i64,
    pub tested_at: DateTime<Utc>,
    pub endpoints: HashMap<String, EndpointProbe>,
}

impl CourseApiAvailability {
    #[inline]
    pub fn restricted_ratio(&self) -> f64 {
        if self.endpoints.is_empty() {
            return 1.0;
        }
        let restricted = self.endpoints.values().filter(|p| !p.available).count();
        restricted as f64 / self.endpoints.len() as f64
    }

    #[inline]
    pub fn has_working_apis(&self) -> bool {
        self.endpoints.values().any(|p| p.available)
    }

    #[inline]
    pub fn is_available(&self, name: &str) -> bool {
        self.endpoints.get(name).is_some_and(|p| p.available)
    }

    /// Whether web discovery should run, given the configured
    /// restricted-proportion threshold.
    #[inline]
    pub fn recommend_web_discovery(&self, threshold: f64) -> bool {
        self.restricted_ratio() > threshold
    }
}

/// Probe the fixed endpoint list for one course. All probes run as one
/// concurrent batch; a failure in one never cancels or fails the others,
/// and nothing here throws for an unavailable upstream.
#[inline]
pub async fn probe_course(client: &LmsClient, course_id: i64) -> CourseApiAvailability {
    debug!("Probing {} endpoints for course {}", PROBED_ENDPOINTS.len(), course_id);

    let probes = PROBED_ENDPOINTS
        .iter()
        .map(|(name, template)| probe_endpoint(client, course_id, name, template));
    let results = join_all(probes).await;

    let endpoints: HashMap<String, EndpointProbe> = results
        .into_iter()
        .map(|probe| (probe.name.clone(), probe))
        .collect();

    let availability = CourseApiAvailability {
        course_id,
        tested_at: Utc::now(),
        endpoints,
    };

    info!(
        "Probe for course {}: {}/{} endpoints restricted",
        course_id,
        availability
            .endpoints
            .values()
            .filter(|p| !p.available)
            .count(),
        availability.endpoints.len()
    );

    availability
}

async fn probe_endpoint(
    client: &LmsClient,
    course_id: i64,
    name: &str,
    template: &str,
) -> EndpointProbe {
    let path = template.replace("{id}", &course_id.to_string());

    let url = match client.api_url(&path) {
        Ok(url) => url,
        Err(e) => {
            return EndpointProbe {
                name: name.to_string(),
                path,
                available: false,
                status_code: None,
                error: Some(e.to_string()),
            };
        }
    };

    match client.get_statused(url).await {
        Ok(response) => EndpointProbe {
            name: name.to_string(),
            path,
            available: response.is_success(),
            status_code: Some(response.status),
            error: if response.is_success() {
                None
            } else {
                Some(format!("HTTP {}", response.status))
            },
        },
        Err(e) => EndpointProbe {
            name: name.to_string(),
            path,
            available: false,
            status_code: None,
            error: Some(e.to_string()),
        },
    }
}
