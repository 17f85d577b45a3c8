
use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

/// One embedded chunk of course content, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EmbeddingChunk {
    pub id: i64,
    pub course_id: i64,
    /// Identifier of the source within its kind (file id, page slug, ...)
    pub source_id: String,
    pub source_kind: SourceKind,
    pub source_name: String,
    pub chunk_index: i64,
    pub content: String,
    /// Embedding vector stored as little-endian f32 bytes
    pub embedding: Vec<u8>,
    pub indexed_date: NaiveDateTime,
}

impl EmbeddingChunk {
    #[inline]
    pub fn vector(&self) -> Result<Vec<f32>> {
        decode_embedding(&self.embedding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Page,
    Assignment,
    Syllabus,
}

impl std::fmt::Display for SourceKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Page => write!(f, "page"),
            SourceKind::Assignment => write!(f, "assignment"),
            SourceKind::Syllabus => write!(f, "syllabus"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEmbeddingChunk {
    pub course_id: i64,
    pub source_id: String,
    pub source_kind: SourceKind,
    pub source_name: String,
    pub chunk_index: i64,
    pub content: String,
    pub embedding: Vec<u8>,
}

/// Encode an embedding vector as little-endian f32 bytes for BLOB storage.
#[inline]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a stored BLOB back into an embedding vector.
#[inline]
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(anyhow!(
            "Embedding blob length {} is not a multiple of 4",
            bytes.len()
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
