#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub lms: LmsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection settings for the upstream LMS REST API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LmsConfig {
    /// Base URL of the LMS installation, e.g. `https://canvas.example.edu`
    pub base_url: String,
    /// Bearer token used for both API and web requests
    pub access_token: String,
    pub timeout_seconds: u64,
    /// Delay enforced between consecutive upstream requests
    pub rate_limit_ms: u64,
    pub max_retries: u32,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://canvas.example.edu".to_string(),
            access_token: String::new(),
            timeout_seconds: 30,
            rate_limit_ms: 250,
            max_retries: 3,
        }
    }
}

/// Tuning for the in-memory index and file caches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for a cached course content index
    pub index_ttl_seconds: u64,
    /// TTL for a cached parsed file; entries older than this must not be served
    pub file_ttl_seconds: u64,
    /// Window after which a still-valid file entry should be freshness-checked
    pub file_revalidate_seconds: u64,
    pub file_max_entries: usize,
    /// Parsed content larger than this is never cached
    pub file_max_content_bytes: usize,
    pub preview_max_chars: usize,
    /// Interval for the background expiry sweep
    pub sweep_interval_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            index_ttl_seconds: 3600,
            file_ttl_seconds: 24 * 3600,
            file_revalidate_seconds: 6 * 3600,
            file_max_entries: 100,
            file_max_content_bytes: 10 * 1024 * 1024,
            preview_max_chars: 1500,
            sweep_interval_seconds: 600,
        }
    }
}

/// Options for structural web discovery of restricted courses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Upper bound on common page slugs tested per course
    pub max_pages: usize,
    pub timeout_ms: u64,
    pub include_navigation: bool,
    pub extract_embedded_content: bool,
    pub respect_rate_limit: bool,
    /// Delay between sequential page content extractions
    pub rate_limit_ms: u64,
    /// Restricted-endpoint proportion above which web discovery is recommended
    pub restricted_ratio_threshold: f64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_pages: 12,
            timeout_ms: 30_000,
            include_navigation: true,
            extract_embedded_content: true,
            respect_rate_limit: true,
            rate_limit_ms: 500,
            restricted_ratio_threshold: 0.5,
        }
    }
}

/// Connection settings for the embedding endpoint (Ollama-compatible API).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: 768,
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Connection settings for the small model backing intent classification
/// and reranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub timeout_seconds: u64,
    /// TTL for cached intent classifications and rerank results
    pub cache_ttl_seconds: u64,
    /// Candidate sets smaller than this are never sent to the model
    pub rerank_min_candidates: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3.2:3b".to_string(),
            timeout_seconds: 20,
            cache_ttl_seconds: 300,
            rerank_min_candidates: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid LMS base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name (cannot be empty)")]
    InvalidModel,
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid restricted ratio threshold: {0} (must be within 0.0..=1.0)")]
    InvalidRestrictedRatio(f64),
    #[error("File revalidation window ({0}s) must be shorter than the file TTL ({1}s)")]
    RevalidateExceedsTtl(u64, u64),
    #[error("Invalid cache capacity: {0} (must be at least 1)")]
    InvalidCacheCapacity(usize),
    #[error("Invalid preview limit: {0} (must be at least 100 characters)")]
    InvalidPreviewLimit(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                lms: LmsConfig::default(),
                cache: CacheConfig::default(),
                discovery: DiscoveryConfig::default(),
                embedding: EmbeddingConfig::default(),
                assistant: AssistantConfig::default(),
                base_dir: config_dir.as_ref().to_path_buf(),
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the platform config dir (`~/.config/course-scout` on Linux).
    #[inline]
    pub fn load_default() -> Result<Self> {
        let dir = default_config_dir()?;
        Self::load(dir)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.base_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.lms.base_url)
            .map_err(|_| ConfigError::InvalidBaseUrl(self.lms.base_url.clone()))?;

        for protocol in [&self.embedding.protocol, &self.assistant.protocol] {
            if protocol != "http" && protocol != "https" {
                return Err(ConfigError::InvalidProtocol(protocol.clone()));
            }
        }
        for port in [self.embedding.port, self.assistant.port] {
            if port == 0 {
                return Err(ConfigError::InvalidPort(port));
            }
        }
        if self.embedding.model.is_empty() || self.assistant.model.is_empty() {
            return Err(ConfigError::InvalidModel);
        }
        if self.embedding.batch_size == 0 || self.embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.embedding.batch_size));
        }
        if self.embedding.embedding_dimension < 64 || self.embedding.embedding_dimension > 4096 {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding.embedding_dimension,
            ));
        }
        if self.embedding.chunk_overlap >= self.embedding.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.embedding.chunk_overlap,
                self.embedding.chunk_size,
            ));
        }
        if !(0.0..=1.0).contains(&self.discovery.restricted_ratio_threshold) {
            return Err(ConfigError::InvalidRestrictedRatio(
                self.discovery.restricted_ratio_threshold,
            ));
        }
        if self.cache.file_revalidate_seconds >= self.cache.file_ttl_seconds {
            return Err(ConfigError::RevalidateExceedsTtl(
                self.cache.file_revalidate_seconds,
                self.cache.file_ttl_seconds,
            ));
        }
        if self.cache.file_max_entries == 0 {
            return Err(ConfigError::InvalidCacheCapacity(self.cache.file_max_entries));
        }
        if self.cache.preview_max_chars < 100 {
            return Err(ConfigError::InvalidPreviewLimit(self.cache.preview_max_chars));
        }

        Ok(())
    }

    /// Path of the SQLite database holding the embedding store.
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.base_dir.join("scout.db")
    }

    #[inline]
    pub fn embedding_url(&self) -> Result<Url> {
        build_service_url(
            &self.embedding.protocol,
            &self.embedding.host,
            self.embedding.port,
        )
    }

    #[inline]
    pub fn assistant_url(&self) -> Result<Url> {
        build_service_url(
            &self.assistant.protocol,
            &self.assistant.host,
            self.assistant.port,
        )
    }
}

fn build_service_url(protocol: &str, host: &str, port: u16) -> Result<Url> {
    Url::parse(&format!("{}://{}:{}", protocol, host, port))
        .with_context(|| format!("Invalid service URL {}://{}:{}", protocol, host, port))
}

/// Resolve the platform-specific config directory for course-scout.
#[inline]
pub fn default_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine platform config directory")?;
    Ok(base.join("course-scout"))
}
