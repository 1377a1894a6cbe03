use image::RgbImage;
use serde::Serialize;

/// Side length of the square face crop fed to the embedder.
pub const FACE_CROP_SIZE: u32 = 160;

/// Bounding box for a detected face, in source-image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// A 160x160 RGB face crop ready for embedding.
#[derive(Debug, Clone)]
pub struct FaceCrop(RgbImage);

impl FaceCrop {
    /// Wrap an image that is already exactly 160x160.
    pub fn new(image: RgbImage) -> Option<Self> {
        if image.dimensions() == (FACE_CROP_SIZE, FACE_CROP_SIZE) {
            Some(Self(image))
        } else {
            None
        }
    }

    /// Wrap the output of a resize to `FACE_CROP_SIZE`.
    pub(crate) fn from_resized(image: RgbImage) -> Self {
        debug_assert_eq!(image.dimensions(), (FACE_CROP_SIZE, FACE_CROP_SIZE));
        Self(image)
    }

    pub fn image(&self) -> &RgbImage {
        &self.0
    }
}

/// Face embedding vector (128-dimensional for FaceNet).
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "facenet-128").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. A zero-norm
    /// embedding has similarity 0 with everything; any other embedding has
    /// similarity exactly 1 with itself.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (a as f64, b as f64);
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        if self.values == other.values {
            return 1.0;
        }

        (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
    }

    /// Cosine distance `1 - similarity`, in [0, 2].
    pub fn cosine_distance(&self, other: &Embedding) -> f32 {
        1.0 - self.similarity(other)
    }
}

/// Outcome of comparing two face embeddings against a distance threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub is_match: bool,
    /// `1 - distance`.
    pub similarity_score: f32,
    pub distance: f32,
    pub threshold: f32,
}

/// Coarse confidence level for an activity similarity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    /// Bucket a similarity score. The cutoffs are fixed and do not follow
    /// the caller's verification threshold.
    pub fn from_similarity(similarity: f32) -> Self {
        if similarity > 0.35 {
            Self::High
        } else if similarity > 0.25 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Image/text alignment score from the joint embedding model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityScore {
    /// Dot product of the L2-normalized image and text embeddings, in [-1, 1].
    pub similarity: f32,
    pub confidence: ConfidenceBucket,
}

/// Activity verification decision for one image/description pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityVerdict {
    pub verified: bool,
    pub similarity_score: f32,
    pub confidence: ConfidenceBucket,
    pub threshold: f32,
}
