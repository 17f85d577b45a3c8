
use anyhow::{Result, anyhow};
use chrono::Utc;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::assistant::{AssistantClient, IntentClassification, RerankCandidate};
use crate::cache::{CourseContentIndex, CourseIndexCache, ExtractionMethod, IndexMetadata};
use crate::config::Config;
use crate::discovery::{
    DiscoveredFile, DiscoveredLink, DiscoveredPage, DiscoveryOptions, WebDiscoveryEngine,
};
use crate::indexer::{CourseIndexer, SemanticMatch};
use crate::lms::LmsClient;
use crate::lms::types::{FileMeta, PageSummary};
use crate::probe::{self, CourseApiAvailability};

#[derive(Debug, Clone, Copy)]
pub struct ExtractionOptions {
    /// Bypass the index cache and rebuild from upstream
    pub force_refresh: bool,
    /// Permit web discovery at all; when off, extraction is API-only
    pub use_web_discovery: bool,
    /// Run web discovery regardless of what the probe recommends
    pub force_web_discovery: bool,
    /// Additional attempts when an extraction run finds nothing
    pub max_retries: u32,
    /// Overall bound on one extraction attempt
    pub timeout: Option<Duration>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            use_web_discovery: true,
            force_web_discovery: false,
            max_retries: 0,
            timeout: None,
        }
    }
}

/// Outcome of one extraction run, carrying the built index plus everything a
/// caller needs to explain how it was obtained.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub course_id: i64,
    pub method: ExtractionMethod,
    pub index: CourseContentIndex,
    pub duration_ms: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ContentSearchResult {
    pub course_id: i64,
    pub query: String,
    pub method: ExtractionMethod,
    pub files: Vec<Scored<DiscoveredFile>>,
    pub pages: Vec<Scored<DiscoveredPage>>,
    pub links: Vec<Scored<DiscoveredLink>>,
    pub total_matches: usize,
}

#[derive(Debug, Clone)]
pub struct SmartSearchResult {
    pub intent: IntentClassification,
    pub results: ContentSearchResult,
    pub semantic: Vec<SemanticMatch>,
    pub reranked: bool,
}

/// Coordinates probing, extraction and caching for course content.
///
/// Every public operation consults the index cache first; a fresh index is
/// always stored back wholesale. The probe decides the extraction strategy:
/// web discovery when enough endpoints are restricted, plain API listing
/// when everything works, and a hybrid merge in between.
pub struct ContentExtractor {
    client: Arc<LmsClient>,
    index_cache: Arc<CourseIndexCache>,
    discovery_options: DiscoveryOptions,
    restricted_ratio_threshold: f64,
}

impl ContentExtractor {
    #[inline]
    pub fn new(
        client: Arc<LmsClient>,
        index_cache: Arc<CourseIndexCache>,
        config: &Config,
    ) -> Self {
        Self {
            client,
            index_cache,
            discovery_options: DiscoveryOptions::from(&config.discovery),
            restricted_ratio_threshold: config.discovery.restricted_ratio_threshold,
        }
    }

    /// Produce the content index for a course, from cache when possible.
    ///
    /// An attempt that finds nothing is retried up to `max_retries` times;
    /// an attempt that outlives `timeout` is an error.
    pub async fn extract(
        &self,
        course_id: i64,
        options: ExtractionOptions,
    ) -> Result<ExtractionResult> {
        let started = Instant::now();

        if !options.force_refresh {
            if let Some(index) = self.index_cache.get(course_id).await {
                debug!("Serving course {course_id} index from cache");
                return Ok(ExtractionResult {
                    course_id,
                    method: ExtractionMethod::Cached,
                    index,
                    duration_ms: started.elapsed().as_millis() as u64,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                    success: true,
                });
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let run = self.extract_once(course_id, options);
            let result = match options.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
                    anyhow!("Extraction of course {course_id} timed out after {limit:?}")
                })??,
                None => run.await?,
            };

            if result.success || attempt > options.max_retries {
                return Ok(result);
            }
            warn!(
                "Extraction attempt {attempt} for course {course_id} found nothing, retrying"
            );
        }
    }

    async fn extract_once(
        &self,
        course_id: i64,
        options: ExtractionOptions,
    ) -> Result<ExtractionResult> {
        let started = Instant::now();
        let availability = probe::probe_course(&self.client, course_id).await;
        let method = self.choose_method(&availability, options);
        info!(
            "Extracting course {course_id} via {method} ({}% of probed endpoints restricted)",
            (availability.restricted_ratio() * 100.0).round()
        );

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut pages = Vec::new();
        let mut files = Vec::new();
        let mut links = Vec::new();
        let mut searchable_text = String::new();
        let mut success = false;

        if matches!(method, ExtractionMethod::Api | ExtractionMethod::Hybrid) {
            let api = self.api_extract(course_id).await;
            success = !api.pages.is_empty() || !api.files.is_empty() || api.usable;
            pages = api.pages;
            files = api.files;
            searchable_text = api.searchable_text;
            warnings.extend(api.warnings);
        }

        if matches!(method, ExtractionMethod::Web | ExtractionMethod::Hybrid) {
            let engine = WebDiscoveryEngine::new(&self.client);
            let discovered = engine.discover(course_id, &self.discovery_options).await;
            success = success || discovered.success;
            errors.extend(discovered.errors);
            warnings.extend(discovered.warnings);
            merge_pages(&mut pages, discovered.pages);
            merge_files(&mut files, discovered.files);
            links.extend(discovered.links);
            if !discovered.searchable_text.is_empty() {
                if !searchable_text.is_empty() {
                    searchable_text.push('\n');
                }
                searchable_text.push_str(&discovered.searchable_text);
            }
        }

        let index = CourseContentIndex {
            course_id,
            last_scanned_at: Utc::now(),
            metadata: IndexMetadata {
                total_files: files.len(),
                total_pages: pages.len(),
                has_restricted_apis: availability.restricted_ratio() > 0.0,
                method,
            },
            api_availability: availability,
            pages,
            files,
            links,
            searchable_text,
        };

        self.index_cache.put(index.clone()).await;

        Ok(ExtractionResult {
            course_id,
            method,
            index,
            duration_ms: started.elapsed().as_millis() as u64,
            errors,
            warnings,
            success,
        })
    }

    /// Rank a course's indexed content against a query with lightweight term
    /// overlap scoring. Zero-scored items are omitted.
    pub async fn search_content(
        &self,
        course_id: i64,
        query: &str,
        options: ExtractionOptions,
    ) -> Result<ContentSearchResult> {
        let extraction = self.extract(course_id, options).await?;
        let index = extraction.index;

        let files = rank_items(index.files, |f| {
            format!("{} {}", f.file_name, f.source_page_name)
        }, query);
        let pages = rank_items(index.pages, |p| p.name.clone(), query);
        let links = rank_items(index.links, |l| l.title.clone(), query);

        let total_matches = files.len() + pages.len() + links.len();
        debug!("Search for {query:?} in course {course_id}: {total_matches} matches");

        Ok(ContentSearchResult {
            course_id,
            query: query.to_string(),
            method: extraction.method,
            files,
            pages,
            links,
            total_matches,
        })
    }

    /// Intent-aware search: classify the query, filter categories the intent
    /// rules out, fold in semantic matches when an indexer is available, and
    /// rerank the survivors.
    pub async fn smart_search(
        &self,
        course_id: i64,
        query: &str,
        assistant: &AssistantClient,
        indexer: Option<&CourseIndexer>,
    ) -> Result<SmartSearchResult> {
        let intent = assistant.classify_intent(query).await;
        let mut results = self
            .search_content(course_id, query, ExtractionOptions::default())
            .await?;

        if !intent.files {
            results.files.clear();
        }
        if !intent.pages {
            results.pages.clear();
            results.links.clear();
        }
        results.total_matches = results.files.len() + results.pages.len() + results.links.len();

        let semantic = match indexer {
            Some(indexer) => match indexer.search(query, &[course_id], 10).await {
                Ok(matches) => matches,
                Err(e) => {
                    warn!("Semantic search unavailable: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let candidates: Vec<RerankCandidate> = results
            .files
            .iter()
            .map(|f| RerankCandidate {
                id: format!("file:{}", f.item.file_id),
                title: f.item.file_name.clone(),
                snippet: f.item.source_page_name.clone(),
            })
            .chain(results.pages.iter().map(|p| RerankCandidate {
                id: format!("page:{}", p.item.url),
                title: p.item.name.clone(),
                snippet: p.item.path.clone(),
            }))
            .take(10)
            .collect();

        let mut reranked = false;
        if !candidates.is_empty() {
            let outcome = assistant.rerank(query, &candidates).await;
            reranked = outcome.model_ranked;
            let order: HashMap<String, f64> = outcome
                .results
                .into_iter()
                .map(|r| (r.candidate_id, f64::from(r.score)))
                .collect();
            results.files.sort_by(|a, b| {
                let ka = order
                    .get(&format!("file:{}", a.item.file_id))
                    .copied()
                    .unwrap_or(0.0);
                let kb = order
                    .get(&format!("file:{}", b.item.file_id))
                    .copied()
                    .unwrap_or(0.0);
                kb.total_cmp(&ka)
            });
            results.pages.sort_by(|a, b| {
                let ka = order
                    .get(&format!("page:{}", a.item.url))
                    .copied()
                    .unwrap_or(0.0);
                let kb = order
                    .get(&format!("page:{}", b.item.url))
                    .copied()
                    .unwrap_or(0.0);
                kb.total_cmp(&ka)
            });
        }

        Ok(SmartSearchResult {
            intent,
            results,
            semantic,
            reranked,
        })
    }

    fn choose_method(
        &self,
        availability: &CourseApiAvailability,
        options: ExtractionOptions,
    ) -> ExtractionMethod {
        if !options.use_web_discovery {
            return ExtractionMethod::Api;
        }
        if options.force_web_discovery
            || availability.recommend_web_discovery(self.restricted_ratio_threshold)
        {
            // Working endpoints still contribute their content; pure web
            // extraction is reserved for courses where no API answers.
            if availability.has_working_apis() {
                ExtractionMethod::Hybrid
            } else {
                ExtractionMethod::Web
            }
        } else if availability.restricted_ratio() > 0.0 {
            ExtractionMethod::Hybrid
        } else {
            ExtractionMethod::Api
        }
    }

    async fn api_extract(&self, course_id: i64) -> ApiExtraction {
        let mut extraction = ApiExtraction::default();

        match self
            .client
            .get_json::<Vec<PageSummary>>(&format!("courses/{course_id}/pages?per_page=100"))
            .await
        {
            Ok(summaries) => {
                extraction.usable = true;
                for summary in summaries {
                    extraction.searchable_text.push_str(&summary.title);
                    extraction.searchable_text.push('\n');
                    extraction.pages.push(page_from_summary(course_id, summary));
                }
            }
            Err(e) => extraction.warnings.push(format!("Pages API: {e}")),
        }

        match self
            .client
            .get_json::<Vec<FileMeta>>(&format!("courses/{course_id}/files?per_page=100"))
            .await
        {
            Ok(metas) => {
                extraction.usable = true;
                for meta in metas {
                    extraction.searchable_text.push_str(&meta.display_name);
                    extraction.searchable_text.push('\n');
                    extraction.files.push(file_from_meta(meta));
                }
            }
            Err(e) => extraction.warnings.push(format!("Files API: {e}")),
        }

        extraction
    }
}

#[derive(Debug, Default)]
struct ApiExtraction {
    pages: Vec<DiscoveredPage>,
    files: Vec<DiscoveredFile>,
    searchable_text: String,
    warnings: Vec<String>,
    /// True once at least one listing endpoint answered
    usable: bool,
}

fn page_from_summary(course_id: i64, summary: PageSummary) -> DiscoveredPage {
    let path = format!("courses/{course_id}/pages/{}", summary.url);
    DiscoveredPage {
        name: summary.title,
        url: format!("/{path}"),
        path,
        accessible: true,
        content_type: "page".to_string(),
        last_checked_at: Utc::now(),
        embedded_files: None,
        embedded_links: None,
    }
}

fn file_from_meta(meta: FileMeta) -> DiscoveredFile {
    DiscoveredFile {
        file_id: meta.id,
        file_name: meta.display_name,
        url: meta.url.unwrap_or_default(),
        source_page_name: "course files".to_string(),
        file_type: meta.content_type,
        size: meta.size,
        last_modified: meta.updated_at,
    }
}

// API-derived pages carry site-relative URLs while web discovery produces
// absolute ones, so page identity is the site path, not the raw URL.
fn page_key(page: &DiscoveredPage) -> &str {
    page.path.trim_start_matches('/')
}

fn merge_pages(existing: &mut Vec<DiscoveredPage>, incoming: Vec<DiscoveredPage>) {
    let seen: HashSet<String> = existing.iter().map(|p| page_key(p).to_string()).collect();
    existing.extend(incoming.into_iter().filter(|p| !seen.contains(page_key(p))));
}

fn merge_files(existing: &mut Vec<DiscoveredFile>, incoming: Vec<DiscoveredFile>) {
    let seen: HashSet<i64> = existing.iter().map(|f| f.file_id).collect();
    existing.extend(incoming.into_iter().filter(|f| !seen.contains(&f.file_id)));
}

fn rank_items<T>(items: Vec<T>, text_of: impl Fn(&T) -> String, query: &str) -> Vec<Scored<T>> {
    items
        .into_iter()
        .filter_map(|item| {
            let score = relevance_score(query, &text_of(&item));
            (score > 0.0).then_some(Scored { item, score })
        })
        .sorted_by(|a, b| b.score.total_cmp(&a.score))
        .collect()
}

/// Term overlap relevance: a verbatim phrase match is worth 1.0, each term
/// occurrence adds 0.3, and the sum is dampened by text length so short
/// exact names beat long texts that merely mention a term.
#[inline]
pub fn relevance_score(query: &str, text: &str) -> f64 {
    let q = query.trim().to_lowercase();
    let t = text.to_lowercase();
    if q.is_empty() || t.is_empty() {
        return 0.0;
    }

    let mut score = if t.contains(&q) { 1.0 } else { 0.0 };
    for term in q.split_whitespace() {
        score += 0.3 * t.matches(term).count() as f64;
    }

    score / (t.len() as f64 + 1.0).ln()
}
