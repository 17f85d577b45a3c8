pub mod types;


use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::LmsConfig;

const BACKOFF_BASE_MS: u64 = 250;

/// Outcome of a single upstream call where the status itself is the data.
///
/// The prober and discovery layers classify non-2xx responses instead of
/// treating them as errors, so this shape never hides the status code.
#[derive(Debug, Clone)]
pub struct StatusedResponse {
    pub status: u16,
    pub body: String,
}

impl StatusedResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated async client for one LMS installation.
///
/// Owns rate limiting between consecutive requests and retry with
/// exponential backoff for transient failures. All course-scout upstream
/// traffic funnels through this type.
#[derive(Debug)]
pub struct LmsClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
    rate_limit_ms: u64,
    max_retries: u32,
    last_request_time: Mutex<Option<Instant>>,
}

impl LmsClient {
    #[inline]
    pub fn new(config: &LmsConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid LMS base URL: {}", config.base_url))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent("course-scout/0.1.0 (Course Content Indexer)")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            access_token: config.access_token.clone(),
            rate_limit_ms: config.rate_limit_ms,
            max_retries: config.max_retries,
            last_request_time: Mutex::new(None),
        })
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an absolute URL for an API path like `courses/42/tabs`.
    #[inline]
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("/api/v1/{}", path.trim_start_matches('/')))
            .with_context(|| format!("Failed to build API URL for path: {}", path))
    }

    /// Build an absolute URL for a web path like `courses/42/pages/syllabus`.
    #[inline]
    pub fn web_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(&format!("/{}", path.trim_start_matches('/')))
            .with_context(|| format!("Failed to build web URL for path: {}", path))
    }

    /// GET an API path, returning the status and body without treating a
    /// non-2xx status as an error. Network failures still surface as `Err`
    /// for the caller to classify.
    #[inline]
    pub async fn get_statused(&self, url: Url) -> Result<StatusedResponse> {
        self.apply_rate_limit().await;

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(StatusedResponse { status, body })
    }

    /// GET and deserialize an API path; non-2xx is an error here.
    #[inline]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.api_url(path)?;
        let body = self.get_with_retry(url.clone()).await?;

        serde_json::from_str(&body)
            .with_context(|| format!("Failed to parse JSON response from {}", url))
    }

    /// GET a web path and return the raw HTML body.
    #[inline]
    pub async fn get_html(&self, path: &str) -> Result<String> {
        let url = self.web_url(path)?;
        self.get_with_retry(url).await
    }

    /// Lightweight existence check: 2xx means the resource resolves.
    /// A definite 4xx is a definite "no"; transport failures are errors so
    /// the caller can decide whether absence or flakiness is in play.
    #[inline]
    pub async fn exists(&self, url: Url) -> Result<bool> {
        let response = self.get_statused(url).await?;
        Ok(response.is_success())
    }

    /// Download raw bytes, e.g. a file body for the document parser.
    #[inline]
    pub async fn get_bytes(&self, url: Url) -> Result<Vec<u8>> {
        self.apply_rate_limit().await;

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP error {} fetching {}", status.as_u16(), url));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read bytes from {}", url))?;
        Ok(bytes.to_vec())
    }

    async fn get_with_retry(&self, url: Url) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 1)));
                debug!("Retrying {} in {:?} (attempt {})", url, delay, attempt + 1);
                sleep(delay).await;
            }

            self.apply_rate_limit().await;

            match self.try_get(url.clone()).await {
                Ok(body) => return Ok(body),
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    warn!("Retryable error for {}: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("All retry attempts failed for {}", url)))
    }

    async fn try_get(&self, url: Url) -> Result<String> {
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("HTTP error {}", status.as_u16()));
        }

        response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))
    }

    /// Sleep if the previous request finished more recently than the
    /// configured rate limit allows.
    async fn apply_rate_limit(&self) {
        if self.rate_limit_ms == 0 {
            return;
        }

        let mut last = self.last_request_time.lock().await;
        if let Some(last_time) = *last {
            let rate_limit = Duration::from_millis(self.rate_limit_ms);
            let elapsed = last_time.elapsed();
            if elapsed < rate_limit {
                let wait = rate_limit - elapsed;
                debug!("Rate limiting: sleeping for {:?}", wait);
                sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Transient failures worth retrying: transport errors, 5xx, and 429.
fn is_retryable_error(error: &anyhow::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("timeout")
        || error_str.contains("connection")
        || error_str.contains("network")
    {
        return true;
    }

    if error_str.contains("http error 5") {
        return true;
    }

    if error_str.contains(&format!("http error {}", StatusCode::TOO_MANY_REQUESTS.as_u16())) {
        return true;
    }

    false
}
