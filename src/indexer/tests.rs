use super::*;
use crate::cache::FileContentCache;
use crate::config::{CacheConfig, Config, LmsConfig};
use crate::database::Database;
use crate::files::{FileContentService, TextDocumentParser};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_indexer(
    lms: &MockServer,
    embedder: &MockServer,
) -> (TempDir, CourseIndexer) {
    let lms_config = LmsConfig {
        base_url: lms.uri(),
        access_token: "token".to_string(),
        rate_limit_ms: 0,
        ..LmsConfig::default()
    };
    let client = Arc::new(LmsClient::new(&lms_config).unwrap());

    let uri = Url::parse(&embedder.uri()).unwrap();
    let mut config = Config::default();
    config.embedding.protocol = uri.scheme().to_string();
    config.embedding.host = uri.host_str().unwrap().to_string();
    config.embedding.port = uri.port().unwrap();

    let temp_dir = TempDir::new().unwrap();
    let database = Database::new(temp_dir.path().join("scout.db"))
        .await
        .unwrap();

    let cache_config = CacheConfig::default();
    let files = Arc::new(FileContentService::new(
        Arc::clone(&client),
        Arc::new(TextDocumentParser),
        Arc::new(FileContentCache::new(&cache_config)),
        &cache_config,
    ));

    let embeddings = EmbeddingClient::new(&config).unwrap();
    let indexer = CourseIndexer::new(client, embeddings, database, files, &config.embedding);
    (temp_dir, indexer)
}

#[tokio::test]
async fn index_course_stores_chunks_for_each_source() {
    let lms = MockServer::start().await;
    let embedder = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 42,
            "name": "Biology 101",
            "syllabus_body": "<p>Course policies and grading scale.</p>",
        })))
        .mount(&lms)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&lms)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&lms)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/assignments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 7, "name": "Homework 1", "description": "<p>Read chapter one.</p>"},
        ])))
        .mount(&lms)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]],
        })))
        .mount(&embedder)
        .await;

    let (_temp_dir, indexer) = test_indexer(&lms, &embedder).await;
    let stats = indexer.index_course(42).await.unwrap();

    assert_eq!(stats.sources_indexed, 2);
    assert_eq!(stats.chunks_indexed, 2);
    assert!(stats.warnings.is_empty());
    assert_eq!(indexer.indexed_courses().await.unwrap(), vec![42]);
}

#[tokio::test]
async fn source_failures_become_warnings_not_errors() {
    let lms = MockServer::start().await;
    let embedder = MockServer::start().await;

    // Course and pages are down; files and assignments are fine
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&lms)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/assignments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&lms)
        .await;

    let (_temp_dir, indexer) = test_indexer(&lms, &embedder).await;
    let stats = indexer.index_course(42).await.unwrap();

    assert_eq!(stats.sources_indexed, 0);
    assert_eq!(stats.chunks_indexed, 0);
    assert_eq!(stats.warnings.len(), 2);
}

#[tokio::test]
async fn search_ranks_by_cosine_similarity() {
    let lms = MockServer::start().await;
    let embedder = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0, 0.0]],
        })))
        .mount(&embedder)
        .await;

    let (_temp_dir, indexer) = test_indexer(&lms, &embedder).await;
    indexer
        .database
        .replace_course_chunks(
            1,
            vec![
                NewEmbeddingChunk {
                    course_id: 1,
                    source_id: "syllabus".to_string(),
                    source_kind: SourceKind::Syllabus,
                    source_name: "Syllabus".to_string(),
                    chunk_index: 0,
                    content: "grading policy".to_string(),
                    embedding: encode_embedding(&[1.0, 0.0]),
                },
                NewEmbeddingChunk {
                    course_id: 1,
                    source_id: "7".to_string(),
                    source_kind: SourceKind::Assignment,
                    source_name: "Homework 1".to_string(),
                    chunk_index: 0,
                    content: "chapter one".to_string(),
                    embedding: encode_embedding(&[0.0, 1.0]),
                },
            ],
        )
        .await
        .unwrap();

    let matches = indexer.search("how is grading done", &[1], 10).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].content, "grading policy");
    assert!((matches[0].score - 1.0).abs() < 1e-6);
    assert!(matches[1].score.abs() < 1e-6);

    let limited = indexer.search("how is grading done", &[1], 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn search_over_unindexed_course_is_empty() {
    let lms = MockServer::start().await;
    let embedder = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [[1.0]],
        })))
        .mount(&embedder)
        .await;

    let (_temp_dir, indexer) = test_indexer(&lms, &embedder).await;
    let matches = indexer.search("anything", &[999], 5).await.unwrap();
    assert!(matches.is_empty());
}
