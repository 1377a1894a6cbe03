//! Activity verification: does an image show the described activity?
//!
//! Scores are cosine similarities from a joint image/text embedding model
//! (see [`crate::clip`]).

use crate::types::{ActivityScore, ActivityVerdict, ConfidenceBucket};
use image::RgbImage;
use thiserror::Error;

/// Default similarity threshold for `verified`.
pub const DEFAULT_ACTIVITY_THRESHOLD: f32 = 0.25;

#[derive(Error, Debug)]
pub enum ActivityError {
    #[error("model file not found: {0}; export CLIP to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("tokenizer: {0}")]
    Tokenizer(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image embedding has {image} dims but text embedding has {text}")]
    DimensionMismatch { image: usize, text: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A model that embeds images and text into a shared space.
///
/// Returned vectors need not be normalized.
pub trait JointScorer {
    fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<f32>, ActivityError>;
    fn encode_text(&mut self, text: &str) -> Result<Vec<f32>, ActivityError>;
}

/// Score how well `image` matches `description`.
pub fn score_activity(
    scorer: &mut dyn JointScorer,
    image: &RgbImage,
    description: &str,
) -> Result<ActivityScore, ActivityError> {
    let image_vec = scorer.encode_image(image)?;
    let text_vec = scorer.encode_text(description)?;

    if image_vec.len() != text_vec.len() {
        return Err(ActivityError::DimensionMismatch {
            image: image_vec.len(),
            text: text_vec.len(),
        });
    }

    let similarity = normalized_dot(&image_vec, &text_vec);
    tracing::debug!(similarity, description, "activity scored");

    Ok(ActivityScore {
        similarity,
        confidence: ConfidenceBucket::from_similarity(similarity),
    })
}

/// Score and decide. `verified` is `similarity > threshold`; the confidence
/// bucket ignores `threshold`.
pub fn verify_activity(
    scorer: &mut dyn JointScorer,
    image: &RgbImage,
    description: &str,
    threshold: f32,
) -> Result<ActivityVerdict, ActivityError> {
    let score = score_activity(scorer, image, description)?;
    Ok(verdict(score, threshold))
}

fn verdict(score: ActivityScore, threshold: f32) -> ActivityVerdict {
    ActivityVerdict {
        verified: score.similarity > threshold,
        similarity_score: score.similarity,
        confidence: score.confidence,
        threshold,
    }
}

/// Dot product of the L2-normalized inputs, clamped to [-1, 1].
fn normalized_dot(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| (x / norm_a) * (y / norm_b)).sum();
    dot.clamp(-1.0, 1.0)
}
