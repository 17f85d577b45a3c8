use super::*;
use crate::config::LmsConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn meta(id: i64, name: &str, url: Option<String>, size: Option<u64>) -> FileMeta {
    FileMeta {
        id,
        display_name: name.to_string(),
        filename: None,
        content_type: None,
        url,
        size,
        updated_at: None,
    }
}

fn test_service(server: &MockServer, cache_config: &CacheConfig) -> FileContentService {
    let lms_config = LmsConfig {
        base_url: server.uri(),
        access_token: "token".to_string(),
        rate_limit_ms: 0,
        ..LmsConfig::default()
    };
    let client = Arc::new(LmsClient::new(&lms_config).unwrap());
    FileContentService::new(
        client,
        Arc::new(TextDocumentParser),
        Arc::new(FileContentCache::new(cache_config)),
        cache_config,
    )
}

#[test]
fn format_detection_prefers_extension() {
    let mut m = meta(1, "Week 1 Notes.PDF", None, None);
    m.content_type = Some("application/octet-stream".to_string());
    assert_eq!(detect_format(&m), "pdf");
}

#[test]
fn format_detection_falls_back_to_mime_type() {
    let mut m = meta(1, "notes", None, None);
    m.content_type = Some("text/plain".to_string());
    assert_eq!(detect_format(&m), "txt");

    m.content_type = None;
    assert_eq!(detect_format(&m), "bin");
}

#[test]
fn format_detection_ignores_bogus_extensions() {
    // A trailing dot-segment that is not a real extension
    let m = meta(1, "lecture.recording session", None, None);
    assert_eq!(detect_format(&m), "bin");
}

#[tokio::test]
async fn text_parser_handles_text_and_html() {
    let parser = TextDocumentParser;

    let doc = parser.parse(b"plain notes", "a.txt", "txt").await.unwrap();
    assert_eq!(doc.text, "plain notes");

    let doc = parser
        .parse(b"<p>hello <b>world</b></p>", "a.html", "html")
        .await
        .unwrap();
    assert!(doc.text.contains("hello world"));
}

#[tokio::test]
async fn text_parser_refuses_binary_formats() {
    let parser = TextDocumentParser;
    let err = parser.parse(b"%PDF-1.7", "a.pdf", "pdf").await.unwrap_err();
    assert!(matches!(err, ParseFailure::UnsupportedFormat(_)));
}

#[tokio::test]
async fn oversize_file_is_skipped_without_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = CacheConfig {
        file_max_content_bytes: 1024,
        ..CacheConfig::default()
    };
    let service = test_service(&server, &config);

    let url = format!("{}/files/9/download", server.uri());
    let result = service
        .fetch(&meta(9, "huge.txt", Some(url.clone()), Some(60 * 1024 * 1024)))
        .await
        .unwrap();

    assert!(result.content.is_none());
    assert!(result.skipped_reason.is_some());
    assert_eq!(result.source_url, Some(url));
}

#[tokio::test]
async fn unparseable_format_is_skipped_with_source_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/12/download"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7".to_vec()))
        .mount(&server)
        .await;

    let config = CacheConfig::default();
    let service = test_service(&server, &config);

    let url = format!("{}/files/12/download", server.uri());
    let result = service
        .fetch(&meta(12, "slides.pdf", Some(url.clone()), Some(8)))
        .await
        .unwrap();

    assert!(result.content.is_none());
    assert!(result.skipped_reason.is_some());
    assert_eq!(result.source_url, Some(url));
    assert_eq!(result.format, "pdf");
}

#[tokio::test]
async fn second_fetch_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/3/download"))
        .respond_with(ResponseTemplate::new(200).set_body_string("syllabus contents"))
        .expect(1)
        .mount(&server)
        .await;

    let config = CacheConfig::default();
    let service = test_service(&server, &config);
    let file = meta(
        3,
        "syllabus.txt",
        Some(format!("{}/files/3/download", server.uri())),
        Some(17),
    );

    let first = service.fetch(&file).await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.content.as_deref(), Some("syllabus contents"));
    assert_eq!(first.preview.as_deref(), Some("syllabus contents"));

    let second = service.fetch(&file).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.content.as_deref(), Some("syllabus contents"));
}

#[tokio::test]
async fn missing_download_url_is_an_error() {
    let server = MockServer::start().await;
    let config = CacheConfig::default();
    let service = test_service(&server, &config);

    assert!(
        service
            .fetch(&meta(4, "orphan.txt", None, Some(10)))
            .await
            .is_err()
    );
}
