//! Fingerprint similarity
//!
//! Cosine similarity between two vectors from the same algorithm, bounded to
//! [0, 1]. Thresholding is left to the caller.

/// Similarity of two fingerprint vectors.
///
/// Vectors of different length, or empty vectors, cannot be compared and
/// score 0. Two all-zero vectors (silence against silence) score 1.
/// The result is exactly symmetric.
pub fn compare(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    match (norm_a > 0.0, norm_b > 0.0) {
        (false, false) => return 1.0,
        (true, true) => {}
        _ => return 0.0,
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_nan() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0) as f32
}

/// Caller-side match decision
pub fn meets_threshold(similarity: f32, threshold: f32) -> bool {
    similarity >= threshold
}
