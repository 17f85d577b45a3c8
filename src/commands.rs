use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assistant::AssistantClient;
use crate::cache::{CourseIndexCache, FileContentCache};
use crate::config::Config;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::files::{FileContentService, TextDocumentParser};
use crate::indexer::CourseIndexer;
use crate::lms::LmsClient;
use crate::lms::types::Course;
use crate::matcher::resolve_best_match;
use crate::orchestrator::{ContentExtractor, ExtractionOptions};
use crate::probe;

fn load_config() -> Result<Config> {
    Config::load_default().context("Failed to load configuration")
}

fn build_client(config: &Config) -> Result<Arc<LmsClient>> {
    Ok(Arc::new(LmsClient::new(&config.lms)?))
}

fn build_extractor(config: &Config, client: Arc<LmsClient>) -> ContentExtractor {
    let index_cache = Arc::new(CourseIndexCache::new(Duration::from_secs(
        config.cache.index_ttl_seconds,
    )));
    ContentExtractor::new(client, index_cache, config)
}

/// Resolve a CLI course selector: a numeric ID is used directly, anything
/// else is fuzzily matched against the enrolled course names.
async fn resolve_course(client: &LmsClient, selector: &str) -> Result<i64> {
    if let Ok(id) = selector.parse::<i64>() {
        return Ok(id);
    }

    let courses: Vec<Course> = client
        .get_json("courses?per_page=100")
        .await
        .context("Failed to list courses while resolving the course name")?;
    let course = resolve_best_match(selector, &courses)
        .ok_or_else(|| anyhow!("No course matches '{selector}'"))?;

    info!("Resolved '{selector}' to course {} ({})", course.name, course.id);
    Ok(course.id)
}

async fn build_indexer(config: &Config, client: Arc<LmsClient>) -> Result<CourseIndexer> {
    std::fs::create_dir_all(&config.base_dir).with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config.base_dir.display()
        )
    })?;
    let database = Database::new(config.database_path())
        .await
        .context("Failed to initialize database")?;
    let files = Arc::new(FileContentService::new(
        Arc::clone(&client),
        Arc::new(TextDocumentParser),
        Arc::new(FileContentCache::new(&config.cache)),
        &config.cache,
    ));
    let embeddings = EmbeddingClient::new(config)?;
    Ok(CourseIndexer::new(
        client,
        embeddings,
        database,
        files,
        &config.embedding,
    ))
}

/// Probe a course's API endpoints and report which are usable.
#[inline]
pub async fn probe_course(course: &str) -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let course_id = resolve_course(&client, course).await?;

    let availability = probe::probe_course(&client, course_id).await;

    println!("API availability for course {course_id}:");
    let mut names: Vec<&String> = availability.endpoints.keys().collect();
    names.sort();
    for name in names {
        let endpoint = &availability.endpoints[name];
        let status = match (endpoint.available, endpoint.status_code) {
            (true, Some(code)) => format!("available (HTTP {code})"),
            (false, Some(code)) => format!("restricted (HTTP {code})"),
            (_, None) => format!(
                "unreachable ({})",
                endpoint.error.as_deref().unwrap_or("unknown error")
            ),
        };
        println!("  {name:<14} {status}");
    }

    let ratio = availability.restricted_ratio();
    println!();
    println!("Restricted: {:.0}%", ratio * 100.0);
    if availability.recommend_web_discovery(config.discovery.restricted_ratio_threshold) {
        println!("Recommendation: use web discovery for this course");
    } else {
        println!("Recommendation: API extraction is sufficient");
    }

    Ok(())
}

/// Build (or rebuild) the content index for a course and print a summary.
#[inline]
pub async fn extract_course(
    course: &str,
    force_refresh: bool,
    force_web: bool,
    no_web: bool,
) -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let course_id = resolve_course(&client, course).await?;
    let extractor = build_extractor(&config, client);

    let options = ExtractionOptions {
        force_refresh,
        use_web_discovery: !no_web,
        force_web_discovery: force_web,
        ..ExtractionOptions::default()
    };
    let result = extractor.extract(course_id, options).await?;

    println!(
        "Extracted course {course_id} via {} in {}ms",
        result.method, result.duration_ms
    );
    println!("  Pages: {}", result.index.pages.len());
    println!("  Files: {}", result.index.files.len());
    println!("  Links: {}", result.index.links.len());
    if result.index.metadata.has_restricted_apis {
        println!("  Some API endpoints are restricted for this course");
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    for error in &result.errors {
        println!("  error: {error}");
    }
    if !result.success {
        println!("No content could be discovered for this course.");
    }

    Ok(())
}

/// Search a course's content, optionally with semantic matching and
/// intent-aware reranking.
#[inline]
pub async fn search_course(course: &str, query: &str, semantic: bool) -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let course_id = resolve_course(&client, course).await?;
    let extractor = build_extractor(&config, Arc::clone(&client));

    if semantic {
        let assistant = AssistantClient::new(&config)?;
        let indexer = build_indexer(&config, client).await?;
        let result = extractor
            .smart_search(course_id, query, &assistant, Some(&indexer))
            .await?;

        println!(
            "Intent: files={} pages={} assignments={} (confidence {:.2})",
            result.intent.files,
            result.intent.pages,
            result.intent.assignments,
            result.intent.confidence
        );
        print_matches(&result.results);

        if !result.semantic.is_empty() {
            println!();
            println!("Semantic matches:");
            for m in &result.semantic {
                println!(
                    "  [{:.3}] {} ({} {})",
                    m.score, m.source_name, m.source_kind, m.source_id
                );
            }
        }
    } else {
        let results = extractor
            .search_content(course_id, query, ExtractionOptions::default())
            .await?;
        print_matches(&results);
    }

    Ok(())
}

fn print_matches(results: &crate::orchestrator::ContentSearchResult) {
    println!(
        "{} matches for {:?} in course {}:",
        results.total_matches, results.query, results.course_id
    );
    for file in &results.files {
        println!("  [file  {:.3}] {}", file.score, file.item.file_name);
    }
    for page in &results.pages {
        println!("  [page  {:.3}] {}", page.score, page.item.name);
    }
    for link in &results.links {
        println!("  [link  {:.3}] {}", link.score, link.item.title);
    }
}

/// Build the semantic index for a course.
#[inline]
pub async fn index_course(course: &str) -> Result<()> {
    let config = load_config()?;
    let client = build_client(&config)?;
    let course_id = resolve_course(&client, course).await?;
    let indexer = build_indexer(&config, client).await?;

    info!("Starting semantic indexing of course {course_id}");
    let stats = indexer.index_course(course_id).await?;
    indexer.optimize_storage().await?;

    println!(
        "Indexed course {course_id}: {} sources, {} chunks",
        stats.sources_indexed, stats.chunks_indexed
    );
    for warning in &stats.warnings {
        println!("  warning: {warning}");
    }

    Ok(())
}

/// Print where the configuration lives; with `show`, also print the active
/// values with the access token redacted.
#[inline]
pub fn show_config(show: bool) -> Result<()> {
    let mut config = load_config()?;
    println!("Configuration directory: {}", config.base_dir.display());

    if show {
        if !config.lms.access_token.is_empty() {
            config.lms.access_token = "<redacted>".to_string();
        }
        let rendered =
            toml::to_string_pretty(&config).context("Failed to render configuration")?;
        println!();
        print!("{rendered}");
    }

    Ok(())
}
