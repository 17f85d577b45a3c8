#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct ChunkQueries;

impl ChunkQueries {
    /// Replace a course's embedding chunks wholesale.
    ///
    /// Delete and reinsert run inside one transaction so a reindex failure
    /// never leaves a course half-replaced.
    #[inline]
    pub async fn replace_for_course(
        pool: &SqlitePool,
        course_id: i64,
        chunks: Vec<NewEmbeddingChunk>,
    ) -> Result<usize> {
        let mut tx = pool
            .begin()
            .await
            .context("Failed to begin reindex transaction")?;

        sqlx::query("DELETE FROM embedding_chunks WHERE course_id = ?")
            .bind(course_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear existing chunks for course")?;

        let now = Utc::now().naive_utc();
        let inserted = chunks.len();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO embedding_chunks
                    (course_id, source_id, source_kind, source_name, chunk_index, content, embedding, indexed_date)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.course_id)
            .bind(&chunk.source_id)
            .bind(chunk.source_kind)
            .bind(&chunk.source_name)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert chunk {} of {} {}",
                    chunk.chunk_index, chunk.source_kind, chunk.source_id
                )
            })?;
        }

        tx.commit()
            .await
            .context("Failed to commit reindex transaction")?;

        debug!("Replaced chunks for course {course_id}: {inserted} inserted");
        Ok(inserted)
    }

    #[inline]
    pub async fn list_by_course(pool: &SqlitePool, course_id: i64) -> Result<Vec<EmbeddingChunk>> {
        let chunks = sqlx::query_as::<_, EmbeddingChunk>(
            r#"
            SELECT id, course_id, source_id, source_kind, source_name,
                   chunk_index, content, embedding, indexed_date
            FROM embedding_chunks
            WHERE course_id = ?
            ORDER BY source_kind, source_id, chunk_index
            "#,
        )
        .bind(course_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks for course")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn count_for_course(pool: &SqlitePool, course_id: i64) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embedding_chunks WHERE course_id = ?")
                .bind(course_id)
                .fetch_one(pool)
                .await
                .context("Failed to count chunks for course")?;

        Ok(count)
    }

    #[inline]
    pub async fn delete_for_course(pool: &SqlitePool, course_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM embedding_chunks WHERE course_id = ?")
            .bind(course_id)
            .execute(pool)
            .await
            .context("Failed to delete chunks for course")?;

        Ok(result.rows_affected())
    }

    /// Courses that currently have persisted chunks.
    #[inline]
    pub async fn indexed_courses(pool: &SqlitePool) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT course_id FROM embedding_chunks ORDER BY course_id",
        )
        .fetch_all(pool)
        .await
        .context("Failed to list indexed courses")?;

        Ok(ids)
    }
}
