#[cfg(test)]
mod tests;

use tracing::debug;

/// Split text into fixed-size overlapping chunks for embedding.
///
/// A sliding window over characters: start at 0, take `size` characters,
/// advance by `size - overlap`, stop once the window start passes the end of
/// the text. The overlap keeps boundary-spanning phrases visible to
/// similarity search. The input is never mutated and the result is finite
/// for any input.
#[inline]
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }

    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    debug!(
        "Chunked {} chars into {} chunks (size {}, overlap {})",
        chars.len(),
        chunks.len(),
        size,
        overlap
    );
    chunks
}

/// Cosine similarity between two vectors.
///
/// Mismatched dimensions or a zero-norm vector yield 0.0 rather than an
/// error; retrieval treats such pairs as simply unrelated.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
