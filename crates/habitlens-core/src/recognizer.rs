//! FaceNet face embedder via ONNX Runtime.
//!
//! Maps 160x160 RGB face crops to 128-dimensional L2-normalized embeddings.

use crate::types::{Embedding, FaceCrop, FACE_CROP_SIZE};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const FACENET_INPUT_SIZE: usize = FACE_CROP_SIZE as usize;
const FACENET_EMBEDDING_DIM: usize = 128;
const FACENET_MODEL_VERSION: &str = "facenet-128";

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("model file not found: {0}; export a FaceNet model to ONNX and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Anything that maps a face crop to an embedding vector.
pub trait Embedder {
    fn embed(&mut self, face: &FaceCrop) -> Result<Embedding, EmbeddingError>;
}

/// FaceNet-based face embedder.
///
/// Expects a Keras-exported graph with NHWC input `[1, 160, 160, 3]`.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbeddingError> {
        if !Path::new(model_path).exists() {
            return Err(EmbeddingError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Standardize a face crop into an NHWC float tensor.
    ///
    /// FaceNet is trained on per-image whitened input: subtract the crop mean,
    /// divide by its standard deviation (floored at 1/sqrt(N)).
    fn preprocess(face: &FaceCrop) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let raw = face.image().as_raw();
        let n = raw.len() as f64;

        let mean = raw.iter().map(|&p| p as f64).sum::<f64>() / n;
        let var = raw.iter().map(|&p| (p as f64 - mean).powi(2)).sum::<f64>() / n;
        let std_adj = var.sqrt().max(1.0 / n.sqrt());
        let (mean, std_adj) = (mean as f32, std_adj as f32);

        let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
        for (x, y, pixel) in face.image().enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, y as usize, x as usize, c]] = (pixel[c] as f32 - mean) / std_adj;
            }
        }

        tensor
    }
}

impl Embedder for FaceEmbedder {
    fn embed(&mut self, face: &FaceCrop) -> Result<Embedding, EmbeddingError> {
        let input = Self::preprocess(face);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();

        if raw.len() != FACENET_EMBEDDING_DIM {
            return Err(EmbeddingError::InferenceFailed(format!(
                "expected {FACENET_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding {
            values: l2_normalize(raw),
            model_version: Some(FACENET_MODEL_VERSION.to_string()),
        })
    }
}

/// L2-normalize a vector. A zero vector is returned unchanged.
pub(crate) fn l2_normalize(v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.into_iter().map(|x| x / norm).collect()
    } else {
        v
    }
}
