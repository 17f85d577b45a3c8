use super::*;
use crate::database::Database;
use anyhow::Result;
use tempfile::TempDir;

async fn create_test_pool() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::new(temp_dir.path().join("scout.db")).await?;
    Ok((temp_dir, database))
}

fn chunk(course_id: i64, kind: SourceKind, source_id: &str, index: i64) -> NewEmbeddingChunk {
    NewEmbeddingChunk {
        course_id,
        source_id: source_id.to_string(),
        source_kind: kind,
        source_name: source_id.to_string(),
        chunk_index: index,
        content: format!("{source_id}:{index}"),
        embedding: encode_embedding(&[index as f32]),
    }
}

#[tokio::test]
async fn replace_for_course_reports_inserted_count() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;

    let inserted = ChunkQueries::replace_for_course(
        database.pool(),
        1,
        vec![
            chunk(1, SourceKind::File, "101", 0),
            chunk(1, SourceKind::Page, "syllabus", 0),
        ],
    )
    .await?;
    assert_eq!(inserted, 2);
    assert_eq!(ChunkQueries::count_for_course(database.pool(), 1).await?, 2);

    Ok(())
}

#[tokio::test]
async fn replace_with_empty_set_clears_course() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;

    ChunkQueries::replace_for_course(
        database.pool(),
        1,
        vec![chunk(1, SourceKind::File, "101", 0)],
    )
    .await?;
    let inserted = ChunkQueries::replace_for_course(database.pool(), 1, Vec::new()).await?;

    assert_eq!(inserted, 0);
    assert_eq!(ChunkQueries::count_for_course(database.pool(), 1).await?, 0);

    Ok(())
}

#[tokio::test]
async fn list_by_course_orders_chunks_by_source_then_index() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;

    ChunkQueries::replace_for_course(
        database.pool(),
        1,
        vec![
            chunk(1, SourceKind::File, "101", 1),
            chunk(1, SourceKind::File, "101", 0),
            chunk(1, SourceKind::Assignment, "hw1", 0),
        ],
    )
    .await?;

    let chunks = ChunkQueries::list_by_course(database.pool(), 1).await?;
    let order: Vec<(String, i64)> = chunks
        .iter()
        .map(|c| (c.source_id.clone(), c.chunk_index))
        .collect();
    assert_eq!(
        order,
        vec![
            ("hw1".to_string(), 0),
            ("101".to_string(), 0),
            ("101".to_string(), 1),
        ]
    );

    Ok(())
}

#[tokio::test]
async fn count_for_missing_course_is_zero() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    assert_eq!(
        ChunkQueries::count_for_course(database.pool(), 999).await?,
        0
    );
    Ok(())
}
