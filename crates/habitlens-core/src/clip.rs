//! CLIP (ViT-B/32) joint image/text encoder via ONNX Runtime.
//!
//! Uses the visual and textual halves of CLIP exported as two ONNX graphs,
//! plus the HuggingFace `tokenizer.json` for the text side.

use crate::activity::{ActivityError, JointScorer};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::{Tensor, TensorRef};
use std::path::Path;
use tokenizers::Tokenizer;

const CLIP_IMAGE_SIZE: u32 = 224;
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_1];
/// CLIP's fixed text context length.
const CLIP_CONTEXT_LEN: usize = 77;
const CLIP_PAD_TOKEN: &str = "<|endoftext|>";
const CLIP_PAD_ID_FALLBACK: u32 = 49407;

/// CLIP image/text scorer backed by two ONNX sessions.
pub struct ClipScorer {
    visual: Session,
    textual: Session,
    tokenizer: Tokenizer,
    /// Whether the textual graph declares an `attention_mask` input.
    text_takes_mask: bool,
}

impl ClipScorer {
    /// Load the visual and textual graphs and the tokenizer.
    pub fn load(visual_path: &str, textual_path: &str, tokenizer_path: &str) -> Result<Self, ActivityError> {
        for path in [visual_path, textual_path, tokenizer_path] {
            if !Path::new(path).exists() {
                return Err(ActivityError::ModelNotFound(path.to_string()));
            }
        }

        let visual = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(visual_path)?;
        tracing::info!(
            path = visual_path,
            inputs = ?visual.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?visual.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded CLIP visual model"
        );

        let textual = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(textual_path)?;
        let text_takes_mask = textual.inputs().iter().any(|i| i.name() == "attention_mask");
        tracing::info!(
            path = textual_path,
            inputs = ?textual.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?textual.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            text_takes_mask,
            "loaded CLIP textual model"
        );

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| ActivityError::Tokenizer(format!("failed to load tokenizer: {e}")))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: CLIP_CONTEXT_LEN,
                ..Default::default()
            }))
            .map_err(|e| ActivityError::Tokenizer(format!("failed to set truncation: {e}")))?;

        let pad_id = tokenizer.token_to_id(CLIP_PAD_TOKEN).unwrap_or(CLIP_PAD_ID_FALLBACK);
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::Fixed(CLIP_CONTEXT_LEN),
            pad_id,
            pad_token: CLIP_PAD_TOKEN.to_string(),
            ..Default::default()
        }));

        tracing::info!(tokenizer = tokenizer_path, pad_id, "CLIP tokenizer loaded");

        Ok(Self {
            visual,
            textual,
            tokenizer,
            text_takes_mask,
        })
    }
}

impl JointScorer for ClipScorer {
    fn encode_image(&mut self, image: &RgbImage) -> Result<Vec<f32>, ActivityError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ActivityError::InferenceFailed("empty image".into()));
        }

        let input = preprocess_image(image);
        let outputs = self.visual.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let value = outputs.get("image_embeds").unwrap_or_else(|| &outputs[0]);
        let (_, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| ActivityError::InferenceFailed(format!("image embedding: {e}")))?;

        Ok(data.to_vec())
    }

    fn encode_text(&mut self, text: &str) -> Result<Vec<f32>, ActivityError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ActivityError::Tokenizer(format!("tokenization failed: {e}")))?;

        let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
        let shape = vec![1i64, ids.len() as i64];

        let ids_tensor = Tensor::from_array((shape.clone(), ids.into_boxed_slice()))?;

        let outputs = if self.text_takes_mask {
            let mask_tensor = Tensor::from_array((shape, mask.into_boxed_slice()))?;
            self.textual.run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            })?
        } else {
            self.textual.run(ort::inputs! {
                "input_ids" => ids_tensor,
            })?
        };

        let value = outputs.get("text_embeds").unwrap_or_else(|| &outputs[0]);
        let (_, data) = value
            .try_extract_tensor::<f32>()
            .map_err(|e| ActivityError::InferenceFailed(format!("text embedding: {e}")))?;

        Ok(data.to_vec())
    }
}

/// Resize the short side to 224 (bicubic), centre-crop 224x224, and
/// normalize into a CLIP NCHW tensor.
fn preprocess_image(image: &RgbImage) -> Array4<f32> {
    let size = CLIP_IMAGE_SIZE;
    let (w, h) = image.dimensions();
    let scale = size as f32 / w.min(h) as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(size);
    let new_h = ((h as f32 * scale).round() as u32).max(size);

    let resized = imageops::resize(image, new_w, new_h, FilterType::CatmullRom);
    let left = (new_w - size) / 2;
    let top = (new_h - size) / 2;
    let cropped = imageops::crop_imm(&resized, left, top, size, size).to_image();

    let s = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, s, s));
    for (x, y, pixel) in cropped.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 / 255.0 - CLIP_MEAN[c]) / CLIP_STD[c];
        }
    }

    tensor
}
