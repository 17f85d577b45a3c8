
use fancy_regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

/// A typed reference parsed out of an LMS-flavored URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceRef {
    Course { course_id: i64 },
    Page { course_id: i64, slug: String },
    File { course_id: Option<i64>, file_id: i64 },
    Assignment { course_id: i64, assignment_id: i64 },
    Module { course_id: i64, module_id: i64 },
    Discussion { course_id: i64, topic_id: i64 },
}

/// A file reference pulled out of raw page HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedFileRef {
    pub file_id: i64,
    pub file_name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    External,
    Internal,
    Video,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    pub title: String,
    pub url: String,
    pub kind: LinkKind,
}

// Pattern 1: direct anchors to course file paths, capturing the link text as
// a filename candidate.
static FILE_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<a\s[^>]*href="([^"]*/courses/\d+/files/(\d+)[^"]*)"[^>]*>\s*([^<]*?)\s*</a>"#)
        .expect("file anchor pattern is valid")
});

// Pattern 2: anchors the rich-content editor marks with the
// instructure_file_link class; the title attribute holds the filename.
static CLASSED_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<a\s[^>]*class="[^"]*instructure_file_link[^"]*"[^>]*href="([^"]*/files/(\d+)[^"]*)"[^>]*>"#,
    )
    .expect("classed anchor pattern is valid")
});

static TITLE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"title="([^"]+)""#).expect("title attribute pattern is valid"));

// Pattern 3: API endpoint data attributes on embedded media and links.
static API_ENDPOINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-api-endpoint="([^"]*/api/v1/(?:courses/\d+/)?files/(\d+)[^"]*)""#)
        .expect("api endpoint pattern is valid")
});

/// Parse an LMS URL (absolute or site-relative) into a typed resource
/// reference. Returns `None` for URLs that do not address a known resource.
#[inline]
pub fn parse_resource_url(raw: &str) -> Option<ResourceRef> {
    let path = if let Ok(url) = Url::parse(raw) {
        url.path().to_string()
    } else {
        // Site-relative path like `/courses/42/pages/syllabus`
        raw.split(['?', '#']).next().unwrap_or(raw).to_string()
    };

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["courses", course] => Some(ResourceRef::Course {
            course_id: course.parse().ok()?,
        }),
        ["courses", course, "pages", slug] => Some(ResourceRef::Page {
            course_id: course.parse().ok()?,
            slug: (*slug).to_string(),
        }),
        ["courses", course, "files", file] | ["api", "v1", "courses", course, "files", file] => {
            Some(ResourceRef::File {
                course_id: Some(course.parse().ok()?),
                file_id: trim_file_id(file)?,
            })
        }
        ["files", file] | ["api", "v1", "files", file] => Some(ResourceRef::File {
            course_id: None,
            file_id: trim_file_id(file)?,
        }),
        ["courses", course, "assignments", assignment] => Some(ResourceRef::Assignment {
            course_id: course.parse().ok()?,
            assignment_id: assignment.parse().ok()?,
        }),
        ["courses", course, "modules", module] => Some(ResourceRef::Module {
            course_id: course.parse().ok()?,
            module_id: module.parse().ok()?,
        }),
        ["courses", course, "discussion_topics", topic] => Some(ResourceRef::Discussion {
            course_id: course.parse().ok()?,
            topic_id: topic.parse().ok()?,
        }),
        _ => None,
    }
}

// File segments sometimes carry a trailing verb, e.g. `555/download`.
fn trim_file_id(segment: &str) -> Option<i64> {
    segment.parse().ok()
}

/// Extract embedded file references from raw HTML using the three
/// independent scrape patterns, deduplicated by file id (first hit wins).
#[inline]
pub fn extract_embedded_files(html: &str) -> Vec<EmbeddedFileRef> {
    let mut seen: HashSet<i64> = HashSet::new();
    let mut files = Vec::new();

    for captures in FILE_ANCHOR_RE.captures_iter(html).flatten() {
        let (Some(whole), Some(url), Some(id), Some(text)) = (
            captures.get(0),
            captures.get(1),
            captures.get(2),
            captures.get(3),
        ) else {
            continue;
        };
        let Ok(file_id) = id.as_str().parse::<i64>() else {
            continue;
        };
        if seen.insert(file_id) {
            // The rich-content editor puts the real filename in the title
            // attribute; the anchor text is often a display label.
            let title = title_attribute(whole.as_str());
            files.push(EmbeddedFileRef {
                file_id,
                file_name: title
                    .unwrap_or_else(|| name_or_fallback(text.as_str(), url.as_str(), file_id)),
                url: url.as_str().to_string(),
            });
        }
    }

    for captures in CLASSED_ANCHOR_RE.captures_iter(html).flatten() {
        let (Some(whole), Some(url), Some(id)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        let Ok(file_id) = id.as_str().parse::<i64>() else {
            continue;
        };
        if seen.insert(file_id) {
            let title = title_attribute(whole.as_str());
            files.push(EmbeddedFileRef {
                file_id,
                file_name: title
                    .unwrap_or_else(|| name_or_fallback("", url.as_str(), file_id)),
                url: url.as_str().to_string(),
            });
        }
    }

    for captures in API_ENDPOINT_RE.captures_iter(html).flatten() {
        let (Some(url), Some(id)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let Ok(file_id) = id.as_str().parse::<i64>() else {
            continue;
        };
        if seen.insert(file_id) {
            files.push(EmbeddedFileRef {
                file_id,
                file_name: name_or_fallback("", url.as_str(), file_id),
                url: url.as_str().to_string(),
            });
        }
    }

    debug!("Extracted {} embedded file references", files.len());
    files
}

fn title_attribute(anchor: &str) -> Option<String> {
    TITLE_ATTR_RE
        .captures(anchor)
        .ok()
        .flatten()
        .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
}

fn name_or_fallback(text: &str, url: &str, file_id: i64) -> String {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    // Last meaningful path segment, skipping route nouns and ids
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    path.rsplit('/')
        .find(|s| {
            !s.is_empty()
                && !matches!(*s, "download" | "files" | "courses" | "api" | "v1" | "preview")
                && !s.chars().all(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("file_{}", file_id))
}

/// Extract anchors from HTML and classify each by URL shape.
///
/// `base_host` is the LMS host; matching hosts (and relative URLs that are
/// not file links) classify as internal.
#[inline]
pub fn extract_links(html: &str, base_host: &str) -> Vec<ExtractedLink> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if href.starts_with('#') || href.starts_with("mailto:") || href.starts_with("javascript:")
        {
            continue;
        }
        if !seen.insert(href.to_string()) {
            continue;
        }

        let title = element.text().collect::<String>().trim().to_string();
        let title = if title.is_empty() {
            href.to_string()
        } else {
            title
        };

        links.push(ExtractedLink {
            title,
            url: href.to_string(),
            kind: classify_link(href, base_host),
        });
    }

    links
}

/// Classify a link by URL shape: known video hosts and media extensions are
/// `video`, office/pdf extensions are `document`, same-host or relative URLs
/// are `internal`, everything else is `external`.
#[inline]
pub fn classify_link(href: &str, base_host: &str) -> LinkKind {
    let lower = href.to_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);

    const VIDEO_HOSTS: [&str; 4] = ["youtube.com", "youtu.be", "vimeo.com", "echo360"];
    const VIDEO_EXTENSIONS: [&str; 4] = [".mp4", ".mov", ".webm", ".m4v"];
    const DOCUMENT_EXTENSIONS: [&str; 8] = [
        ".pdf", ".doc", ".docx", ".ppt", ".pptx", ".xls", ".xlsx", ".rtf",
    ];

    if VIDEO_HOSTS.iter().any(|h| lower.contains(h))
        || VIDEO_EXTENSIONS.iter().any(|e| path.ends_with(e))
    {
        return LinkKind::Video;
    }
    if DOCUMENT_EXTENSIONS.iter().any(|e| path.ends_with(e)) {
        return LinkKind::Document;
    }

    match Url::parse(href) {
        Ok(url) => {
            if url.host_str() == Some(base_host) {
                LinkKind::Internal
            } else {
                LinkKind::External
            }
        }
        // Relative URLs resolve against the LMS itself
        Err(_) => LinkKind::Internal,
    }
}

/// Strip markup from HTML and return readable plain text.
///
/// Script, style and noscript contents are dropped; entity decoding comes
/// from the HTML parser; whitespace runs collapse to single spaces with
/// paragraph-ish breaks preserved as newlines.
#[inline]
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::new();

    for node in document.root_element().descendants() {
        if let Some(text) = node.value().as_text() {
            let skip = node.ancestors().any(|a| {
                a.value()
                    .as_element()
                    .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
            });
            if !skip {
                out.push_str(text);
                out.push(' ');
            }
        } else if let Some(element) = node.value().as_element() {
            if matches!(
                element.name(),
                "p" | "div" | "br" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            ) {
                out.push('\n');
            }
        }
    }

    collapse_whitespace(&out)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&collapsed);
        }
    }
    out
}

/// Heuristic check for bodies that are really an authentication redirect
/// rather than course content. These are reported as a distinct failure,
/// not as an empty page.
#[inline]
pub fn looks_like_auth_redirect(html: &str) -> bool {
    let lower = html.to_lowercase();

    lower.contains("/login/canvas")
        || lower.contains("id=\"login_form\"")
        || lower.contains("name=\"pseudonym_session")
        || (lower.contains("<form") && lower.contains("action=\"/login\""))
        || lower.contains("you need to log in")
}
