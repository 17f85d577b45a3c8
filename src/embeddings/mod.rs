// Semantic indexing support: text chunking and the embedding endpoint client.

pub mod chunking;
pub mod client;

pub use chunking::{chunk_text, cosine_similarity};
pub use client::EmbeddingClient;
