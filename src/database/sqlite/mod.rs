use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{EmbeddingChunk, NewEmbeddingChunk};
use crate::database::sqlite::queries::ChunkQueries;


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    // Embedding chunk operations
    pub async fn replace_course_chunks(
        &self,
        course_id: i64,
        chunks: Vec<NewEmbeddingChunk>,
    ) -> Result<usize> {
        ChunkQueries::replace_for_course(&self.pool, course_id, chunks).await
    }

    pub async fn get_chunks_for_course(&self, course_id: i64) -> Result<Vec<EmbeddingChunk>> {
        ChunkQueries::list_by_course(&self.pool, course_id).await
    }

    pub async fn count_chunks_for_course(&self, course_id: i64) -> Result<i64> {
        ChunkQueries::count_for_course(&self.pool, course_id).await
    }

    pub async fn delete_course_chunks(&self, course_id: i64) -> Result<u64> {
        ChunkQueries::delete_for_course(&self.pool, course_id).await
    }

    pub async fn indexed_courses(&self) -> Result<Vec<i64>> {
        ChunkQueries::indexed_courses(&self.pool).await
    }

    /// Optimize database performance by running VACUUM and ANALYZE
    pub async fn optimize(&self) -> Result<()> {
        info!("Optimizing database performance");

        sqlx::query("VACUUM")
            .execute(&self.pool)
            .await
            .context("Failed to vacuum database")?;

        sqlx::query("ANALYZE")
            .execute(&self.pool)
            .await
            .context("Failed to analyze database")?;

        debug!("Database optimization completed");
        Ok(())
    }
}
