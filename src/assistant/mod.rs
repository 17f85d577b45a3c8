
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;

const FALLBACK_CONFIDENCE: f32 = 0.3;
const FALLBACK_REASONING: &str = "fallback due to API error";

/// Which content categories a query is asking about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    #[serde(default)]
    pub files: bool,
    #[serde(default)]
    pub pages: bool,
    #[serde(default)]
    pub assignments: bool,
    #[serde(default)]
    pub discussions: bool,
    #[serde(default)]
    pub grades: bool,
    #[serde(default)]
    pub calendar: bool,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankCandidate {
    pub id: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankResult {
    pub candidate_id: String,
    pub score: f32,
    pub reasoning: String,
}

/// Ranked candidates plus whether the model produced the ordering. The flag
/// is false for short-circuited small sets and for fallback orderings.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    pub results: Vec<RerankResult>,
    pub model_ranked: bool,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct RawRerankEntry {
    id: String,
    score: f32,
    #[serde(default)]
    reasoning: String,
}

struct CachedValue<T> {
    value: T,
    cached_at: Instant,
}

/// Client for the small language model that classifies query intent and
/// reranks search candidates. Every operation degrades to a deterministic
/// result when the model is unreachable, so callers never fail because of
/// this component.
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: Url,
    model: String,
    cache_ttl: Duration,
    rerank_min_candidates: usize,
    intent_cache: Mutex<HashMap<String, CachedValue<IntentClassification>>>,
    rerank_cache: Mutex<HashMap<String, CachedValue<RerankOutcome>>>,
}

impl AssistantClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .assistant_url()
            .context("Failed to build assistant endpoint URL from config")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.assistant.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.assistant.model.clone(),
            cache_ttl: Duration::from_secs(config.assistant.cache_ttl_seconds),
            rerank_min_candidates: config.assistant.rerank_min_candidates,
            intent_cache: Mutex::new(HashMap::new()),
            rerank_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Classify what a query is asking for. Never fails: model errors
    /// produce the keyword fallback, and results are cached either way.
    pub async fn classify_intent(&self, query: &str) -> IntentClassification {
        let cache_key = normalize_query(query);

        {
            let cache = self.intent_cache.lock().await;
            if let Some(cached) = cache.get(&cache_key) {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    debug!("Intent cache hit for query");
                    return cached.value.clone();
                }
            }
        }

        let classification = match self.classify_with_model(query).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Intent classification failed, using keyword fallback: {e}");
                fallback_classification(query)
            }
        };

        let mut cache = self.intent_cache.lock().await;
        cache.insert(
            cache_key,
            CachedValue {
                value: classification.clone(),
                cached_at: Instant::now(),
            },
        );
        classification
    }

    /// Order candidates by relevance to the query.
    ///
    /// Small candidate sets keep their original order with descending
    /// scores and never touch the model. Model failures fall back to the
    /// same order-preserving scoring.
    pub async fn rerank(&self, query: &str, candidates: &[RerankCandidate]) -> RerankOutcome {
        if candidates.len() < self.rerank_min_candidates {
            debug!(
                "Skipping rerank for {} candidates (minimum {})",
                candidates.len(),
                self.rerank_min_candidates
            );
            return RerankOutcome {
                results: order_preserving_scores(candidates),
                model_ranked: false,
            };
        }

        let cache_key = rerank_cache_key(query, candidates);
        {
            let cache = self.rerank_cache.lock().await;
            if let Some(cached) = cache.get(&cache_key) {
                if cached.cached_at.elapsed() < self.cache_ttl {
                    debug!("Rerank cache hit for query");
                    return cached.value.clone();
                }
            }
        }

        let outcome = match self.rerank_with_model(query, candidates).await {
            Ok(results) => RerankOutcome {
                results,
                model_ranked: true,
            },
            Err(e) => {
                warn!("Rerank failed, keeping original candidate order: {e}");
                RerankOutcome {
                    results: order_preserving_scores(candidates),
                    model_ranked: false,
                }
            }
        };

        let mut cache = self.rerank_cache.lock().await;
        cache.insert(
            cache_key,
            CachedValue {
                value: outcome.clone(),
                cached_at: Instant::now(),
            },
        );
        outcome
    }

    async fn classify_with_model(&self, query: &str) -> Result<IntentClassification> {
        let prompt = format!(
            "Classify this student query about course content. Respond with JSON only, \
             with boolean fields \"files\", \"pages\", \"assignments\", \"discussions\", \
             \"grades\", \"calendar\", a \"confidence\" number between 0 and 1, and a short \
             \"reasoning\" string.\n\nQuery: {query}"
        );

        let raw = self.generate(&prompt).await?;
        let mut classification: IntentClassification =
            serde_json::from_str(&raw).context("Model returned malformed intent JSON")?;
        classification.confidence = classification.confidence.clamp(0.0, 1.0);
        Ok(classification)
    }

    async fn rerank_with_model(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<Vec<RerankResult>> {
        let listing = candidates
            .iter()
            .map(|c| format!("- id: {}, title: {}, snippet: {}", c.id, c.title, c.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Rank these course content candidates by relevance to the query. Respond with a \
             JSON object {{\"results\": [{{\"id\", \"score\", \"reasoning\"}}]}} where score \
             is between 0 and 1.\n\nQuery: {query}\n\nCandidates:\n{listing}"
        );

        let raw = self.generate(&prompt).await?;

        #[derive(Deserialize)]
        struct RawRerankResponse {
            results: Vec<RawRerankEntry>,
        }
        let parsed: RawRerankResponse =
            serde_json::from_str(&raw).context("Model returned malformed rerank JSON")?;

        let mut by_id: HashMap<&str, &RawRerankEntry> =
            parsed.results.iter().map(|e| (e.id.as_str(), e)).collect();

        // Every input candidate gets a result; ids the model dropped or
        // invented are scored zero or ignored respectively.
        let mut results: Vec<RerankResult> = candidates
            .iter()
            .map(|c| match by_id.remove(c.id.as_str()) {
                Some(entry) => RerankResult {
                    candidate_id: c.id.clone(),
                    score: entry.score.clamp(0.0, 1.0),
                    reasoning: entry.reasoning.clone(),
                },
                None => RerankResult {
                    candidate_id: c.id.clone(),
                    score: 0.0,
                    reasoning: "not ranked by model".to_string(),
                },
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self
            .base_url
            .join("/api/generate")
            .context("Failed to build generate URL")?;

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json".to_string(),
        };

        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .context("Assistant model is unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Assistant model returned HTTP {}",
                response.status().as_u16()
            ));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse assistant response")?;
        Ok(body.response)
    }
}

/// Keyword-based classification used whenever the model is unavailable.
#[inline]
pub fn fallback_classification(query: &str) -> IntentClassification {
    let q = query.to_lowercase();
    let contains_any = |terms: &[&str]| terms.iter().any(|t| q.contains(t));

    IntentClassification {
        files: true,
        pages: true,
        assignments: contains_any(&["assignment", "homework", "hw", "submit", "due"]),
        discussions: contains_any(&["discussion", "forum", "post", "reply"]),
        grades: contains_any(&["grade", "score", "marks", "rubric"]),
        calendar: contains_any(&["calendar", "schedule", "deadline", "due date", "when is"]),
        confidence: FALLBACK_CONFIDENCE,
        reasoning: FALLBACK_REASONING.to_string(),
    }
}

fn order_preserving_scores(candidates: &[RerankCandidate]) -> Vec<RerankResult> {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| RerankResult {
            candidate_id: c.id.clone(),
            score: (1.0 - 0.1 * i as f32).max(0.0),
            reasoning: "ranked by original order".to_string(),
        })
        .collect()
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

fn rerank_cache_key(query: &str, candidates: &[RerankCandidate]) -> String {
    let mut key = normalize_query(query);
    for candidate in candidates {
        key.push('\u{1f}');
        key.push_str(&candidate.id);
    }
    key
}
