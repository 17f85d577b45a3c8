use super::*;

/// Rejoin chunks by dropping each subsequent chunk's leading overlap.
fn reconstruct(chunks: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap));
        }
    }
    out
}

#[test]
fn short_text_single_chunk() {
    let chunks = chunk_text("hello", 100, 20);
    assert_eq!(chunks, vec!["hello".to_string()]);
}

#[test]
fn empty_text_no_chunks() {
    assert!(chunk_text("", 100, 20).is_empty());
    assert!(chunk_text("text", 0, 0).is_empty());
}

#[test]
fn window_sizes_and_step() {
    let text = "abcdefghij"; // 10 chars
    let chunks = chunk_text(text, 4, 2);

    // Starts at 0, 2, 4, 6, 8
    assert_eq!(chunks, vec!["abcd", "cdef", "efgh", "ghij"]);
}

#[test]
fn de_overlapped_concatenation_reconstructs_input() {
    let text: String = (0..997).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    for (size, overlap) in [(100, 20), (64, 0), (50, 49)] {
        let chunks = chunk_text(&text, size, overlap);
        assert_eq!(reconstruct(&chunks, overlap), text, "size={size} overlap={overlap}");
    }
}

#[test]
fn chunk_count_is_bounded() {
    let text = "x".repeat(1000);
    let size = 100;
    let overlap = 25;
    let step = size - overlap;

    let chunks = chunk_text(&text, size, overlap);
    let bound = 1000_usize.div_ceil(step);
    assert!(chunks.len() <= bound, "{} > {}", chunks.len(), bound);
    assert!(chunks.iter().all(|c| c.chars().count() <= size));
}

#[test]
fn multibyte_text_chunks_on_char_boundaries() {
    let text = "héllo wörld ünïcode tëxt".repeat(10);
    let chunks = chunk_text(&text, 16, 4);
    assert_eq!(reconstruct(&chunks, 4), text);
}

#[test]
fn cosine_self_similarity_is_one() {
    let v = vec![0.5, -1.25, 3.0, 0.1];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
}

#[test]
fn cosine_zero_vector_is_zero() {
    let v = vec![1.0, 2.0, 3.0];
    let zero = vec![0.0, 0.0, 0.0];
    assert_eq!(cosine_similarity(&v, &zero), 0.0);
    assert_eq!(cosine_similarity(&zero, &zero), 0.0);
}

#[test]
fn cosine_dimension_mismatch_is_zero() {
    assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
}

#[test]
fn cosine_orthogonal_and_opposite() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
}
