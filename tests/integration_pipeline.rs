#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end extraction flows against a mocked LMS: probe, strategy
// selection, web fallback, caching and search.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use course_scout::cache::{CourseIndexCache, ExtractionMethod};
use course_scout::config::{Config, LmsConfig};
use course_scout::lms::LmsClient;
use course_scout::orchestrator::{ContentExtractor, ExtractionOptions};

fn test_extractor(server: &MockServer) -> ContentExtractor {
    let mut config = Config::default();
    config.lms = LmsConfig {
        base_url: server.uri(),
        access_token: "token".to_string(),
        rate_limit_ms: 0,
        ..LmsConfig::default()
    };
    config.discovery.rate_limit_ms = 0;

    let client = Arc::new(LmsClient::new(&config.lms).expect("can build client"));
    let cache = Arc::new(CourseIndexCache::new(Duration::from_secs(3600)));
    ContentExtractor::new(client, cache, &config)
}

#[tokio::test]
async fn restricted_course_is_discovered_through_the_web() {
    let server = MockServer::start().await;

    // Every API endpoint is restricted for this course
    Mock::given(method("GET"))
        .and(path_regex("^/api/v1/.*"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    // One common page slug resolves and embeds a file and an external video
    Mock::given(method("GET"))
        .and(path("/courses/7/pages/lecture-slides"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
            <h1>Lecture Slides</h1>
            <a class="instructure_file_link" href="/courses/7/files/801/download" title="week1.pdf">Week 1 slides</a>
            <a href="https://www.youtube.com/watch?v=abc123">Lecture recording</a>
            </body></html>"#,
        ))
        .mount(&server)
        .await;

    let extractor = test_extractor(&server);
    let result = extractor
        .extract(7, ExtractionOptions::default())
        .await
        .expect("extraction never fails outright");

    assert_eq!(result.method, ExtractionMethod::Web);
    assert!(result.success);
    assert!(result.index.files.iter().any(|f| f.file_id == 801));
    assert!(
        result
            .index
            .links
            .iter()
            .any(|l| l.url.contains("youtube.com"))
    );

    // The same request again is served from the index cache
    let cached = extractor
        .extract(7, ExtractionOptions::default())
        .await
        .expect("cached extraction succeeds");
    assert_eq!(cached.method, ExtractionMethod::Cached);
    assert_eq!(cached.index.files.len(), result.index.files.len());
}

#[tokio::test]
async fn open_course_uses_api_listing_and_search_finds_files() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/courses/9/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 31, "display_name": "Problem Set 3.pdf", "size": 2048},
            {"id": 32, "display_name": "Reading List.pdf", "size": 1024},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/9/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"url": "syllabus", "title": "Syllabus"},
        ])))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("^/api/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(&server)
        .await;

    let extractor = test_extractor(&server);
    let result = extractor
        .extract(9, ExtractionOptions::default())
        .await
        .expect("extraction succeeds");

    assert_eq!(result.method, ExtractionMethod::Api);
    assert_eq!(result.index.files.len(), 2);
    assert_eq!(result.index.pages.len(), 1);

    let search = extractor
        .search_content(9, "problem set", ExtractionOptions::default())
        .await
        .expect("search succeeds");
    assert_eq!(search.files.len(), 1);
    assert_eq!(search.files[0].item.file_name, "Problem Set 3.pdf");
}

#[tokio::test]
async fn unreachable_host_still_produces_a_result() {
    // Point at a server that immediately drops: probing records failures and
    // discovery finds nothing, but nothing panics or errors out
    let server = MockServer::start().await;
    let extractor = test_extractor(&server);
    drop(server);

    let result = extractor
        .extract(3, ExtractionOptions::default())
        .await
        .expect("extraction degrades instead of failing");

    assert_eq!(result.method, ExtractionMethod::Web);
    assert!(!result.success);
    assert!(result.index.files.is_empty());
}
