use super::*;
use crate::config::LmsConfig;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> LmsClient {
    LmsClient::new(&LmsConfig {
        base_url: server.uri(),
        access_token: "t".to_string(),
        timeout_seconds: 5,
        rate_limit_ms: 0,
        max_retries: 0,
    })
    .expect("build client")
}

fn options(max_pages: usize, include_navigation: bool) -> DiscoveryOptions {
    DiscoveryOptions {
        max_pages,
        timeout_ms: 5000,
        include_navigation,
        extract_embedded_content: true,
        respect_rate_limit: false,
        rate_limit_ms: 0,
    }
}

#[test]
fn slug_humanization() {
    assert_eq!(humanize_slug("syllabus"), "Syllabus");
    assert_eq!(humanize_slug("lecture-slides"), "Lecture Slides");
    assert_eq!(humanize_slug("course_information"), "Course Information");
}

#[test]
fn content_tab_filtering() {
    let tab = |html_url: &str| Tab {
        id: "x".to_string(),
        label: "X".to_string(),
        html_url: html_url.to_string(),
        visibility: None,
        hidden: None,
        kind: None,
    };

    assert!(is_content_tab(&tab("/courses/42"), 42));
    assert!(is_content_tab(&tab("/courses/42/assignments"), 42));
    assert!(is_content_tab(
        &tab("https://lms.example.edu/courses/42/pages/syllabus"),
        42
    ));
    assert!(!is_content_tab(&tab("/courses/42/external_tools/9"), 42));
    assert!(!is_content_tab(&tab("/courses/99/pages"), 42));
}

#[tokio::test]
async fn syllabus_file_discovered_exactly_once() {
    let server = MockServer::start().await;
    // Existence check and raw body fetch for the syllabus slug
    Mock::given(method("GET"))
        .and(path("/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><body>
                <h1>Syllabus</h1>
                <p>Course notes: <a href="{0}/courses/42/files/555">notes.pdf</a></p>
                <span data-api-endpoint="{0}/api/v1/courses/42/files/555"></span>
            </body></html>"#,
            server.uri()
        )))
        .mount(&server)
        .await;
    // Structured API path and everything else (other slugs, file metadata
    // enrichment) answer 404.

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    let result = engine.discover(42, &options(12, false)).await;

    assert!(result.success);
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].name, "Syllabus");

    // Referenced by two HTML patterns, merged to exactly one file
    assert_eq!(result.files.len(), 1);
    assert_eq!(result.files[0].file_id, 555);
    assert_eq!(result.files[0].file_name, "notes.pdf");
    assert_eq!(result.files[0].source_page_name, "Syllabus");

    assert!(result.searchable_text.contains("Course notes"));
}

#[tokio::test]
async fn structured_api_preferred_over_raw_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>raw shell</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": "syllabus",
            "title": "Syllabus",
            "body": "<p>From the structured API</p>"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    let result = engine.discover(42, &options(1, false)).await;

    assert!(result.success);
    assert!(result.searchable_text.contains("From the structured API"));
    assert!(!result.searchable_text.contains("raw shell"));
}

#[tokio::test]
async fn auth_redirect_is_a_warning_not_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><form id="login_form" action="/login/canvas"></form></html>"#,
        ))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    let result = engine.discover(42, &options(1, false)).await;

    // The page resolved, so discovery still succeeds, but its content is a
    // distinct warning rather than scraped text.
    assert!(result.success);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("authentication"));
    assert!(result.searchable_text.is_empty());
}

#[tokio::test]
async fn navigation_and_slug_pages_merge_by_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/tabs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "syllabus", "label": "Syllabus", "html_url": "/courses/42/pages/syllabus"},
            {"id": "hidden_tab", "label": "Secret", "html_url": "/courses/42/pages/secret", "hidden": true},
            {"id": "tool", "label": "External", "html_url": "/courses/42/external_tools/3"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Syllabus body</p>"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    // Slug list includes "syllabus" too; the URL-identical page must not
    // appear twice.
    let result = engine.discover(42, &options(1, true)).await;

    assert!(result.success);
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].name, "Syllabus");
}

#[tokio::test]
async fn total_absence_is_unsuccessful_not_an_error() {
    let server = MockServer::start().await;
    // Everything answers 404.

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    let result = engine.discover(42, &options(12, true)).await;

    assert!(!result.success);
    assert!(result.pages.is_empty());
    assert!(result.files.is_empty());
    assert_eq!(result.errors.len(), 1);
    // Navigation fetch failure degrades to a warning
    assert!(!result.warnings.is_empty());
}

#[tokio::test]
async fn file_metadata_enrichment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/courses/42/pages/syllabus"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<a href="/courses/42/files/555">555.tmp</a>"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/courses/42/files/555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 555,
            "display_name": "Lecture Notes Week 1.pdf",
            "content-type": "application/pdf",
            "size": 204800,
            "updated_at": "2026-02-01T10:00:00Z",
            "url": "https://files.example.edu/555/download"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let engine = WebDiscoveryEngine::new(&client);
    let result = engine.discover(42, &options(1, false)).await;

    assert_eq!(result.files.len(), 1);
    let file = &result.files[0];
    assert_eq!(file.file_name, "Lecture Notes Week 1.pdf");
    assert_eq!(file.file_type.as_deref(), Some("application/pdf"));
    assert_eq!(file.size, Some(204800));
    assert_eq!(file.url, "https://files.example.edu/555/download");
}
