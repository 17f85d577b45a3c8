#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::lms::LmsClient;
use crate::lms::types::{FileMeta, PageBody, Tab};
use crate::scrape::{
    self, EmbeddedFileRef, ExtractedLink, LinkKind, ResourceRef, looks_like_auth_redirect,
};

/// Common page slugs probed for every course, in priority order. Bounded by
/// `max_pages`, so the cheap, high-yield names come first.
pub const COMMON_PAGE_SLUGS: [&str; 12] = [
    "syllabus",
    "schedule",
    "resources",
    "lecture-slides",
    "lecture-notes",
    "readings",
    "materials",
    "course-information",
    "calendar",
    "labs",
    "exams",
    "home",
];

// Course sub-paths a navigation tab may point at and still be worth
// content-checking.
const CONTENT_TAB_SEGMENTS: [&str; 6] = [
    "syllabus",
    "pages",
    "modules",
    "assignments",
    "announcements",
    "discussion_topics",
];

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOptions {
    pub max_pages: usize,
    pub timeout_ms: u64,
    pub include_navigation: bool,
    pub extract_embedded_content: bool,
    pub respect_rate_limit: bool,
    /// Delay between sequential page content extractions
    pub rate_limit_ms: u64,
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    #[inline]
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            timeout_ms: config.timeout_ms,
            include_navigation: config.include_navigation,
            extract_embedded_content: config.extract_embedded_content,
            respect_rate_limit: config.respect_rate_limit,
            rate_limit_ms: config.rate_limit_ms,
        }
    }
}

/// A page found by navigation crawling or slug guessing. Embedded content is
/// attached once after extraction and never updated in place afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPage {
    pub name: String,
    pub url: String,
    /// Site-relative path used for fetches
    pub path: String,
    pub accessible: bool,
    pub content_type: String,
    pub last_checked_at: DateTime<Utc>,
    pub embedded_files: Option<Vec<EmbeddedFileRef>>,
    pub embedded_links: Option<Vec<ExtractedLink>>,
}

/// A file reference in the merged discovery result, deduplicated by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFile {
    pub file_id: i64,
    pub file_name: String,
    pub url: String,
    pub source_page_name: String,
    pub file_type: Option<String>,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub title: String,
    pub url: String,
    pub kind: LinkKind,
    pub source_page_name: String,
}

/// Merged output of one discovery run. `success` is true iff at least one
/// page or file was found; total absence is reported here, never thrown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub pages: Vec<DiscoveredPage>,
    pub files: Vec<DiscoveredFile>,
    pub links: Vec<DiscoveredLink>,
    pub searchable_text: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub success: bool,
}

/// Structural web discovery for courses whose APIs are restricted: crawl
/// navigation tabs, guess common page slugs, scrape what resolves.
pub struct WebDiscoveryEngine<'a> {
    client: &'a LmsClient,
}

impl<'a> WebDiscoveryEngine<'a> {
    #[inline]
    pub fn new(client: &'a LmsClient) -> Self {
        Self { client }
    }

    #[inline]
    pub async fn discover(&self, course_id: i64, options: &DiscoveryOptions) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();

        // Step 1: navigation tabs
        if options.include_navigation {
            match self.discover_from_navigation(course_id).await {
                Ok(pages) => {
                    debug!("Navigation yielded {} candidate pages", pages.len());
                    result.pages.extend(pages);
                }
                Err(e) => {
                    warn!("Navigation discovery failed for course {}: {}", course_id, e);
                    result
                        .warnings
                        .push(format!("Navigation discovery failed: {}", e));
                }
            }
        }

        // Step 2: common page slugs, checked as one concurrent batch
        let slug_pages = self.discover_common_pages(course_id, options.max_pages).await;

        // Step 3: merge by exact URL
        let mut known_urls: HashSet<String> =
            result.pages.iter().map(|p| p.url.clone()).collect();
        for page in slug_pages {
            if known_urls.insert(page.url.clone()) {
                result.pages.push(page);
            }
        }

        // Step 4: per-page content extraction, intentionally sequential so
        // the rate-limit delay applies between upstream requests
        let mut first = true;
        for i in 0..result.pages.len() {
            if !result.pages[i].accessible {
                continue;
            }
            if options.respect_rate_limit && !first {
                sleep(Duration::from_millis(options.rate_limit_ms)).await;
            }
            first = false;

            let page_name = result.pages[i].name.clone();
            match self.extract_page_content(course_id, &result.pages[i]).await {
                Ok(body) => {
                    self.collect_page_content(&mut result, i, &body, options);
                }
                Err(e) => {
                    warn!("Content extraction failed for '{}': {}", page_name, e);
                    result
                        .warnings
                        .push(format!("Failed to extract '{}': {}", page_name, e));
                }
            }
        }

        // Step 6: enrich file metadata via the API where possible
        self.enrich_files(course_id, &mut result.files).await;

        result.success = !result.pages.is_empty() || !result.files.is_empty();
        if !result.success {
            result
                .errors
                .push(format!("No content discovered for course {}", course_id));
        }

        info!(
            "Discovery for course {}: {} pages, {} files, {} links, success={}",
            course_id,
            result.pages.len(),
            result.files.len(),
            result.links.len(),
            result.success
        );

        result
    }

    /// Fetch the course's navigation tabs and keep the visible ones whose
    /// target looks like a content page, accessibility-checking each.
    async fn discover_from_navigation(
        &self,
        course_id: i64,
    ) -> anyhow::Result<Vec<DiscoveredPage>> {
        let tabs: Vec<Tab> = self
            .client
            .get_json(&format!("courses/{}/tabs", course_id))
            .await?;

        let candidates: Vec<Tab> = tabs
            .into_iter()
            .filter(|tab| tab.is_visible() && is_content_tab(tab, course_id))
            .collect();

        let checks = candidates.iter().map(|tab| self.check_tab(course_id, tab));
        let pages = join_all(checks).await.into_iter().flatten().collect();
        Ok(pages)
    }

    async fn check_tab(&self, course_id: i64, tab: &Tab) -> Option<DiscoveredPage> {
        let path = tab_path(tab, course_id);
        let url = self.client.web_url(&path).ok()?;

        let accessible = match self.client.exists(url.clone()).await {
            Ok(ok) => ok,
            Err(e) => {
                debug!("Accessibility check failed for tab '{}': {}", tab.label, e);
                false
            }
        };

        Some(DiscoveredPage {
            name: tab.label.clone(),
            url: url.to_string(),
            path,
            accessible,
            content_type: "navigation".to_string(),
            last_checked_at: Utc::now(),
            embedded_files: None,
            embedded_links: None,
        })
    }

    /// Probe the fixed ordered slug list, bounded by `max_pages`, as one
    /// concurrent batch. Only slugs that resolve are kept.
    async fn discover_common_pages(&self, course_id: i64, max_pages: usize) -> Vec<DiscoveredPage> {
        let checks = COMMON_PAGE_SLUGS
            .iter()
            .take(max_pages)
            .map(|slug| self.check_common_slug(course_id, slug));

        join_all(checks).await.into_iter().flatten().collect()
    }

    async fn check_common_slug(&self, course_id: i64, slug: &str) -> Option<DiscoveredPage> {
        let path = format!("courses/{}/pages/{}", course_id, slug);
        let url = self.client.web_url(&path).ok()?;

        match self.client.exists(url.clone()).await {
            Ok(true) => Some(DiscoveredPage {
                name: humanize_slug(slug),
                url: url.to_string(),
                path,
                accessible: true,
                content_type: "wiki_page".to_string(),
                last_checked_at: Utc::now(),
                embedded_files: None,
                embedded_links: None,
            }),
            Ok(false) => None,
            Err(e) => {
                debug!("Slug check failed for '{}': {}", slug, e);
                None
            }
        }
    }

    /// Fetch one page's body: structured API first, raw web body on failure.
    /// Bodies that look like an authentication redirect are a distinct
    /// failure, not empty content.
    async fn extract_page_content(
        &self,
        course_id: i64,
        page: &DiscoveredPage,
    ) -> anyhow::Result<String> {
        if let Some(ResourceRef::Page { slug, .. }) = scrape::parse_resource_url(&page.url) {
            let api_path = format!("courses/{}/pages/{}", course_id, slug);
            match self.client.get_json::<PageBody>(&api_path).await {
                Ok(body) => return Ok(body.body.unwrap_or_default()),
                Err(e) => {
                    debug!("API page fetch failed for '{}', trying web: {}", slug, e);
                }
            }
        }

        let html = self.client.get_html(&page.path).await?;
        if looks_like_auth_redirect(&html) {
            anyhow::bail!("page requires authentication (login redirect)");
        }
        Ok(html)
    }

    /// Attach embedded content to the page (the one permitted mutation) and
    /// fold files, links and text into the running result.
    fn collect_page_content(
        &self,
        result: &mut DiscoveryResult,
        page_index: usize,
        body: &str,
        options: &DiscoveryOptions,
    ) {
        let base_host = self.client.base_url().host_str().unwrap_or_default().to_string();
        let page_name = result.pages[page_index].name.clone();

        if options.extract_embedded_content {
            let embedded = scrape::extract_embedded_files(body);
            let seen: HashSet<i64> = result.files.iter().map(|f| f.file_id).collect();
            for file in &embedded {
                if !seen.contains(&file.file_id) {
                    result.files.push(DiscoveredFile {
                        file_id: file.file_id,
                        file_name: file.file_name.clone(),
                        url: file.url.clone(),
                        source_page_name: page_name.clone(),
                        file_type: None,
                        size: None,
                        last_modified: None,
                    });
                }
            }

            let links = scrape::extract_links(body, &base_host);
            for link in &links {
                result.links.push(DiscoveredLink {
                    title: link.title.clone(),
                    url: link.url.clone(),
                    kind: link.kind,
                    source_page_name: page_name.clone(),
                });
            }

            result.pages[page_index].embedded_files = Some(embedded);
            result.pages[page_index].embedded_links = Some(links);
        }

        let text = scrape::html_to_text(body);
        if !text.is_empty() {
            result.searchable_text.push_str(&page_name);
            result.searchable_text.push('\n');
            result.searchable_text.push_str(&text);
            result.searchable_text.push_str("\n\n");
        }
    }

    /// Follow-up metadata lookups for HTML-discovered files, issued as one
    /// concurrent batch. Lookup failure keeps the HTML-derived name.
    async fn enrich_files(&self, course_id: i64, files: &mut [DiscoveredFile]) {
        if files.is_empty() {
            return;
        }

        let lookups = files.iter().map(|file| {
            let path = format!("courses/{}/files/{}", course_id, file.file_id);
            async move { self.client.get_json::<FileMeta>(&path).await }
        });
        let metas = join_all(lookups).await;

        for (file, meta) in files.iter_mut().zip(metas) {
            match meta {
                Ok(meta) => {
                    file.file_name = meta.display_name;
                    file.file_type = meta.content_type;
                    file.size = meta.size;
                    file.last_modified = meta.updated_at;
                    if let Some(url) = meta.url {
                        file.url = url;
                    }
                }
                Err(e) => {
                    debug!(
                        "Metadata lookup failed for file {}, keeping HTML name: {}",
                        file.file_id, e
                    );
                }
            }
        }
    }
}

fn is_content_tab(tab: &Tab, course_id: i64) -> bool {
    let prefix = format!("/courses/{}", course_id);
    let Some(start) = tab.html_url.find(&prefix) else {
        return false;
    };
    let rest = &tab.html_url[start + prefix.len()..];
    let segment = rest.trim_start_matches('/').split('/').next().unwrap_or("");

    segment.is_empty() || CONTENT_TAB_SEGMENTS.contains(&segment)
}

fn tab_path(tab: &Tab, course_id: i64) -> String {
    let prefix = format!("/courses/{}", course_id);
    match tab.html_url.find(&prefix) {
        Some(start) => tab.html_url[start..].to_string(),
        None => tab.html_url.clone(),
    }
}

/// `lecture-slides` -> `Lecture Slides`
fn humanize_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
