#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::EmbeddingConfig;
use crate::database::Database;
use crate::database::sqlite::models::{NewEmbeddingChunk, SourceKind, encode_embedding};
use crate::embeddings::{EmbeddingClient, chunk_text, cosine_similarity};
use crate::files::FileContentService;
use crate::lms::LmsClient;
use crate::lms::types::{Assignment, Course, FileMeta, PageBody, PageSummary};
use crate::scrape;

/// One piece of course content gathered for indexing.
#[derive(Debug, Clone)]
struct ContentSource {
    kind: SourceKind,
    id: String,
    name: String,
    text: String,
}

#[derive(Debug, Clone, Default)]
pub struct IndexingStats {
    pub course_id: i64,
    pub sources_indexed: usize,
    pub chunks_indexed: usize,
    pub warnings: Vec<String>,
}

/// A stored chunk scored against a query embedding.
#[derive(Debug, Clone)]
pub struct SemanticMatch {
    pub course_id: i64,
    pub source_kind: SourceKind,
    pub source_id: String,
    pub source_name: String,
    pub chunk_index: i64,
    pub content: String,
    pub score: f32,
}

/// Builds and queries the persisted semantic index of course content.
///
/// Indexing a course gathers its syllabus, pages, parseable files and
/// assignment descriptions, chunks and embeds them, and replaces the
/// course's stored chunks wholesale.
pub struct CourseIndexer {
    client: Arc<LmsClient>,
    embeddings: EmbeddingClient,
    database: Database,
    files: Arc<FileContentService>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl CourseIndexer {
    #[inline]
    pub fn new(
        client: Arc<LmsClient>,
        embeddings: EmbeddingClient,
        database: Database,
        files: Arc<FileContentService>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            client,
            embeddings,
            database,
            files,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    /// Reindex one course from scratch.
    pub async fn index_course(&self, course_id: i64) -> Result<IndexingStats> {
        info!("Indexing course {course_id}");
        let mut stats = IndexingStats {
            course_id,
            ..IndexingStats::default()
        };

        let sources = self.collect_sources(course_id, &mut stats.warnings).await;
        stats.sources_indexed = sources.len();

        let mut new_chunks = Vec::new();
        let mut texts = Vec::new();
        for source in &sources {
            for (i, chunk) in chunk_text(&source.text, self.chunk_size, self.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                texts.push(chunk.clone());
                new_chunks.push(NewEmbeddingChunk {
                    course_id,
                    source_id: source.id.clone(),
                    source_kind: source.kind,
                    source_name: source.name.clone(),
                    chunk_index: i as i64,
                    content: chunk,
                    embedding: Vec::new(),
                });
            }
        }

        let vectors = self
            .embeddings
            .embed_batch(&texts)
            .await
            .context("Failed to embed course content")?;
        for (chunk, vector) in new_chunks.iter_mut().zip(vectors.iter()) {
            chunk.embedding = encode_embedding(vector);
        }

        stats.chunks_indexed = self
            .database
            .replace_course_chunks(course_id, new_chunks)
            .await?;

        info!(
            "Indexed course {course_id}: {} sources, {} chunks, {} warnings",
            stats.sources_indexed,
            stats.chunks_indexed,
            stats.warnings.len()
        );
        Ok(stats)
    }

    /// Rank stored chunks of the given courses against a natural language
    /// query. An unindexed course simply contributes no matches.
    pub async fn search(
        &self,
        query: &str,
        course_ids: &[i64],
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        let query_vector = self
            .embeddings
            .embed(query)
            .await
            .context("Failed to embed search query")?;

        let mut matches = Vec::new();
        for &course_id in course_ids {
            for chunk in self.database.get_chunks_for_course(course_id).await? {
                let vector = match chunk.vector() {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Skipping undecodable chunk {}: {e}", chunk.id);
                        continue;
                    }
                };
                let score = cosine_similarity(&query_vector, &vector);
                matches.push(SemanticMatch {
                    course_id: chunk.course_id,
                    source_kind: chunk.source_kind,
                    source_id: chunk.source_id,
                    source_name: chunk.source_name,
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    score,
                });
            }
        }

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(limit);
        Ok(matches)
    }

    /// Courses that currently have a persisted index.
    #[inline]
    pub async fn indexed_courses(&self) -> Result<Vec<i64>> {
        self.database.indexed_courses().await
    }

    /// Reclaim space and refresh query planner statistics after a reindex.
    #[inline]
    pub async fn optimize_storage(&self) -> Result<()> {
        self.database.optimize().await
    }

    async fn collect_sources(
        &self,
        course_id: i64,
        warnings: &mut Vec<String>,
    ) -> Vec<ContentSource> {
        let mut sources = Vec::new();

        match self
            .client
            .get_json::<Course>(&format!("courses/{course_id}?include[]=syllabus_body"))
            .await
        {
            Ok(course) => {
                if let Some(body) = course.syllabus_body.filter(|b| !b.trim().is_empty()) {
                    sources.push(ContentSource {
                        kind: SourceKind::Syllabus,
                        id: "syllabus".to_string(),
                        name: format!("{} syllabus", course.name),
                        text: scrape::html_to_text(&body),
                    });
                }
            }
            Err(e) => warnings.push(format!("Could not fetch course {course_id}: {e}")),
        }

        match self
            .client
            .get_json::<Vec<PageSummary>>(&format!("courses/{course_id}/pages?per_page=100"))
            .await
        {
            Ok(pages) => {
                for page in pages {
                    match self
                        .client
                        .get_json::<PageBody>(&format!(
                            "courses/{course_id}/pages/{}",
                            page.url
                        ))
                        .await
                    {
                        Ok(body) => {
                            if let Some(html) = body.body.filter(|b| !b.trim().is_empty()) {
                                sources.push(ContentSource {
                                    kind: SourceKind::Page,
                                    id: page.url.clone(),
                                    name: body.title,
                                    text: scrape::html_to_text(&html),
                                });
                            }
                        }
                        Err(e) => {
                            warnings.push(format!("Could not fetch page {}: {e}", page.url));
                        }
                    }
                }
            }
            Err(e) => warnings.push(format!("Could not list pages: {e}")),
        }

        match self
            .client
            .get_json::<Vec<FileMeta>>(&format!("courses/{course_id}/files?per_page=100"))
            .await
        {
            Ok(file_metas) => {
                for meta in file_metas {
                    match self.files.fetch(&meta).await {
                        Ok(file) => {
                            if let Some(text) = file.content.filter(|t| !t.trim().is_empty()) {
                                sources.push(ContentSource {
                                    kind: SourceKind::File,
                                    id: meta.id.to_string(),
                                    name: file.name,
                                    text,
                                });
                            } else if let Some(reason) = file.skipped_reason {
                                debug!("File {} not indexed: {reason}", meta.id);
                            }
                        }
                        Err(e) => {
                            warnings.push(format!(
                                "Could not read file {} ({}): {e}",
                                meta.id, meta.display_name
                            ));
                        }
                    }
                }
            }
            Err(e) => warnings.push(format!("Could not list files: {e}")),
        }

        match self
            .client
            .get_json::<Vec<Assignment>>(&format!(
                "courses/{course_id}/assignments?per_page=100"
            ))
            .await
        {
            Ok(assignments) => {
                for assignment in assignments {
                    if let Some(desc) =
                        assignment.description.filter(|d| !d.trim().is_empty())
                    {
                        sources.push(ContentSource {
                            kind: SourceKind::Assignment,
                            id: assignment.id.to_string(),
                            name: assignment.name,
                            text: scrape::html_to_text(&desc),
                        });
                    }
                }
            }
            Err(e) => warnings.push(format!("Could not list assignments: {e}")),
        }

        sources
    }
}
