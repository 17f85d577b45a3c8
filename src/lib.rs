use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScoutError>;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Discovery error: {0}")]
    Discovery(String),

    #[error("Document parsing error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod assistant;
pub mod cache;
pub mod commands;
pub mod config;
pub mod database;
pub mod discovery;
pub mod embeddings;
pub mod files;
pub mod indexer;
pub mod lms;
pub mod matcher;
pub mod orchestrator;
pub mod probe;
pub mod scrape;
