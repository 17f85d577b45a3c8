#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::cache::{FileCacheKey, FileContentCache};
use crate::cache::file::build_preview;
use crate::config::CacheConfig;
use crate::lms::LmsClient;
use crate::lms::types::FileMeta;
use crate::scrape;

#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("File too large to parse: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("Parser service error: {0}")]
    ServiceError(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    pub text: String,
}

/// Seam between content retrieval and document parsing. Binary formats can
/// be handled by an external service behind this trait without the rest of
/// the pipeline noticing.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(
        &self,
        bytes: &[u8],
        file_name: &str,
        format: &str,
    ) -> Result<ParsedDocument, ParseFailure>;
}

/// Built-in parser for text-based formats. Anything binary is refused and
/// left to an external parser implementation.
#[derive(Debug, Default)]
pub struct TextDocumentParser;

#[async_trait]
impl DocumentParser for TextDocumentParser {
    async fn parse(
        &self,
        bytes: &[u8],
        _file_name: &str,
        format: &str,
    ) -> Result<ParsedDocument, ParseFailure> {
        match format {
            "txt" | "md" | "csv" | "json" => Ok(ParsedDocument {
                text: String::from_utf8_lossy(bytes).into_owned(),
            }),
            "html" | "htm" => Ok(ParsedDocument {
                text: scrape::html_to_text(&String::from_utf8_lossy(bytes)),
            }),
            other => Err(ParseFailure::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Normalized format tag for a file, from its name extension first and its
/// reported MIME type as a fallback.
#[inline]
pub fn detect_format(meta: &FileMeta) -> String {
    let name = meta.filename.as_deref().unwrap_or(&meta.display_name);
    if let Some((_, ext)) = name.rsplit_once('.') {
        let valid = !ext.is_empty()
            && ext.len() <= 5
            && ext.chars().all(|c| c.is_ascii_alphanumeric());
        if valid {
            return ext.to_ascii_lowercase();
        }
    }

    match meta.content_type.as_deref() {
        Some("application/pdf") => "pdf".to_string(),
        Some("text/html") => "html".to_string(),
        Some("text/plain") => "txt".to_string(),
        Some("text/markdown") => "md".to_string(),
        Some("text/csv") => "csv".to_string(),
        Some("application/json") => "json".to_string(),
        Some(mime) => mime
            .rsplit_once('/')
            .map(|(_, sub)| sub.to_ascii_lowercase())
            .unwrap_or_else(|| "bin".to_string()),
        None => "bin".to_string(),
    }
}

/// Parsed content of one file, with the source URL always retained even when
/// the content itself was skipped.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub file_id: i64,
    pub name: String,
    pub format: String,
    pub source_url: Option<String>,
    pub content: Option<String>,
    pub preview: Option<String>,
    pub from_cache: bool,
    pub needs_revalidation: bool,
    pub skipped_reason: Option<String>,
}

/// Cache-fronted file retrieval: every read goes through the file cache, and
/// parsing only happens on a miss.
pub struct FileContentService {
    client: Arc<LmsClient>,
    parser: Arc<dyn DocumentParser>,
    cache: Arc<FileContentCache>,
    max_content_bytes: u64,
    preview_max_chars: usize,
}

impl FileContentService {
    #[inline]
    pub fn new(
        client: Arc<LmsClient>,
        parser: Arc<dyn DocumentParser>,
        cache: Arc<FileContentCache>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            client,
            parser,
            cache,
            max_content_bytes: config.file_max_content_bytes as u64,
            preview_max_chars: config.preview_max_chars,
        }
    }

    /// Retrieve and parse one file, serving from cache when possible.
    ///
    /// Files over the size ceiling are never downloaded; the returned value
    /// still carries the name and source URL so the caller can hand out a
    /// direct link instead.
    pub async fn fetch(&self, meta: &FileMeta) -> Result<FileContent> {
        let format = detect_format(meta);
        let size = meta.size.unwrap_or(0);

        if size > self.max_content_bytes {
            info!(
                "Skipping content of file {} ({}): {} bytes exceeds ceiling of {}",
                meta.id, meta.display_name, size, self.max_content_bytes
            );
            return Ok(FileContent {
                file_id: meta.id,
                name: meta.display_name.clone(),
                format,
                source_url: meta.url.clone(),
                content: None,
                preview: None,
                from_cache: false,
                needs_revalidation: false,
                skipped_reason: Some(format!(
                    "file is {size} bytes, larger than the {} byte content limit",
                    self.max_content_bytes
                )),
            });
        }

        let key = FileCacheKey::new(meta.id, meta.updated_at.as_deref(), size, &format);
        if let Some(entry) = self.cache.get(&key).await {
            let needs_revalidation = self.cache.should_revalidate(&entry);
            return Ok(FileContent {
                file_id: meta.id,
                name: meta.display_name.clone(),
                format,
                source_url: meta.url.clone(),
                content: Some(entry.full_content),
                preview: Some(entry.preview),
                from_cache: true,
                needs_revalidation,
                skipped_reason: None,
            });
        }

        let url_str = meta
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("File {} has no download URL", meta.id))?;
        let url = Url::parse(url_str)
            .with_context(|| format!("Invalid download URL for file {}: {url_str}", meta.id))?;

        let bytes = self
            .client
            .get_bytes(url)
            .await
            .with_context(|| format!("Failed to download file {}", meta.id))?;

        let started = Instant::now();
        let parsed = match self.parser.parse(&bytes, &meta.display_name, &format).await {
            Ok(parsed) => parsed,
            Err(ParseFailure::UnsupportedFormat(fmt)) => {
                // Not an error: the caller still gets the direct link
                info!(
                    "Declining to parse file {} ({}): no parser for {fmt} content",
                    meta.id, meta.display_name
                );
                return Ok(FileContent {
                    file_id: meta.id,
                    name: meta.display_name.clone(),
                    format,
                    source_url: meta.url.clone(),
                    content: None,
                    preview: None,
                    from_cache: false,
                    needs_revalidation: false,
                    skipped_reason: Some(format!("no parser available for {fmt} content")),
                });
            }
            Err(e) => return Err(anyhow!("Failed to parse file {}: {e}", meta.id)),
        };
        let parse_time_ms = started.elapsed().as_millis() as u64;

        debug!(
            "Parsed file {} ({} bytes of {}) in {}ms",
            meta.id,
            bytes.len(),
            format,
            parse_time_ms
        );

        let preview = build_preview(&parsed.text, self.preview_max_chars);
        self.cache.put(key, parsed.text.clone(), parse_time_ms).await;

        Ok(FileContent {
            file_id: meta.id,
            name: meta.display_name.clone(),
            format,
            source_url: meta.url.clone(),
            content: Some(parsed.text),
            preview: Some(preview),
            from_cache: false,
            needs_revalidation: false,
            skipped_reason: None,
        })
    }
}
