
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 500;

/// Client for an Ollama-compatible embedding endpoint.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: Url,
    model: String,
    batch_size: u32,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .embedding_url()
            .context("Failed to build embedding endpoint URL from config")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.embedding.model.clone(),
            batch_size: config.embedding.batch_size,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Check that the embedding server is reachable.
    #[inline]
    pub async fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build ping URL")?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .context("Embedding server is unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Embedding server ping failed with HTTP {}",
                response.status().as_u16()
            ));
        }

        debug!("Embedding server ping successful");
        Ok(())
    }

    /// Generate an embedding for a single text.
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_single_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow!("Embedding response was empty"))
    }

    /// Generate embeddings for many texts, split into server-sized batches.
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size as usize) {
            let batch_results = self
                .embed_single_batch(batch)
                .await
                .with_context(|| format!("Failed to embed batch of {} texts", batch.len()))?;
            results.extend(batch_results);
        }

        Ok(results)
    }

    async fn embed_single_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request = EmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response: EmbedResponse = self.post_with_retry(url, &request).await?;

        if response.embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                response.embeddings.len()
            ));
        }

        Ok(response.embeddings)
    }

    async fn post_with_retry<T: Serialize, R: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        request: &T,
    ) -> Result<R> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            if attempt > 1 {
                let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 2)));
                debug!("Waiting {:?} before embedding retry", delay);
                sleep(delay).await;
            }

            match self.http.post(url.clone()).json(request).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<R>()
                            .await
                            .context("Failed to parse embedding response");
                    }
                    if status.is_server_error() {
                        warn!(
                            "Embedding server error {} (attempt {}/{})",
                            status.as_u16(),
                            attempt,
                            self.retry_attempts
                        );
                        last_error = Some(anyhow!("Server error: HTTP {}", status.as_u16()));
                    } else {
                        // Client errors are not retryable
                        return Err(anyhow!("Client error: HTTP {}", status.as_u16()));
                    }
                }
                Err(e) => {
                    warn!(
                        "Embedding transport error (attempt {}/{}): {}",
                        attempt, self.retry_attempts, e
                    );
                    last_error = Some(anyhow!("Transport error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow!("Embedding request failed after retries")))
    }
}
