//! Face embedding comparison.

use crate::types::{ComparisonResult, Embedding};

/// Default cosine-distance threshold below which two faces match.
pub const DEFAULT_FACE_THRESHOLD: f32 = 0.5;

/// Compare two face embeddings by cosine distance.
///
/// `is_match` is `distance < threshold`; a distance exactly at the threshold
/// does not match. Embeddings must have the same dimension.
pub fn compare_faces(a: &Embedding, b: &Embedding, threshold: f32) -> ComparisonResult {
    debug_assert_eq!(a.values.len(), b.values.len(), "embedding dimension mismatch");

    let distance = a.cosine_distance(b);

    ComparisonResult {
        is_match: distance < threshold,
        similarity_score: 1.0 - distance,
        distance,
        threshold,
    }
}
