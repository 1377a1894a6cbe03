//! habitlens-core: Face and activity verification engine.
//!
//! Uses SCRFD for face detection, FaceNet for face embeddings and CLIP for
//! image/text activity scoring, all running via ONNX Runtime for CPU inference.

pub mod activity;
pub mod clip;
pub mod comparator;
pub mod decode;
pub mod detector;
pub mod locator;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use activity::{verify_activity, ActivityError, JointScorer, DEFAULT_ACTIVITY_THRESHOLD};
pub use clip::ClipScorer;
pub use comparator::{compare_faces, DEFAULT_FACE_THRESHOLD};
pub use decode::{decode_base64_image, DecodeError};
pub use detector::{Detector, DetectorError, FaceDetector};
pub use locator::{locate_face, FaceLocation, DEFAULT_MARGIN};
pub use recognizer::{Embedder, EmbeddingError, FaceEmbedder};
pub use types::{
    ActivityScore, ActivityVerdict, ComparisonResult, ConfidenceBucket, Embedding, FaceBox, FaceCrop,
};

/// SCRFD detection model file name.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// FaceNet embedding model file name.
pub const FACENET_MODEL_FILE: &str = "facenet.onnx";
/// CLIP image encoder file name.
pub const CLIP_VISUAL_MODEL_FILE: &str = "clip_visual.onnx";
/// CLIP text encoder file name.
pub const CLIP_TEXTUAL_MODEL_FILE: &str = "clip_textual.onnx";
/// CLIP tokenizer file name (HuggingFace `tokenizer.json` format).
pub const CLIP_TOKENIZER_FILE: &str = "clip_tokenizer.json";

/// Default model directory: `$XDG_DATA_HOME/habitlens/models`, falling back
/// to `~/.local/share/habitlens/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("habitlens/models")
}
