//! Face location: pick the largest detected face, pad it by a margin,
//! and produce a fixed-size crop for the embedder.

use crate::detector::{Detector, DetectorError};
use crate::types::{FaceBox, FaceCrop, FACE_CROP_SIZE};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Default fractional padding around a detected face.
pub const DEFAULT_MARGIN: f32 = 0.2;

/// Resampling filter for the face crop. Bilinear, so embeddings stay
/// reproducible for a given input.
pub const CROP_FILTER: FilterType = FilterType::Triangle;

const NO_FACE_REASON: &str = "No face detected in image";
const DEGENERATE_FACE_REASON: &str = "Detected face lies outside the image";

/// Integer pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of looking for a face. Not finding one is an ordinary outcome.
#[derive(Debug, Clone)]
pub enum FaceLocation {
    Found {
        crop: FaceCrop,
        /// Detector confidence of the selected box.
        confidence: f32,
    },
    NotFound {
        reason: String,
    },
}

/// Select the face with the largest area. Ties keep the earliest box.
pub fn select_largest(faces: &[FaceBox]) -> Option<&FaceBox> {
    faces.iter().fold(None, |best: Option<&FaceBox>, face| match best {
        Some(b) if b.area() >= face.area() => Some(b),
        _ => Some(face),
    })
}

/// Pad a face box by `margin × width` horizontally and `margin × height`
/// vertically on each side, clamped to an `image_width × image_height` image.
///
/// Box coordinates are truncated to whole pixels before padding. Returns
/// `None` when nothing of the box remains inside the image.
pub fn expand_box(face: &FaceBox, margin: f32, image_width: u32, image_height: u32) -> Option<CropRect> {
    let x = face.x as i64;
    let y = face.y as i64;
    let w = face.width as i64;
    let h = face.height as i64;
    let pad_x = (margin * w as f32) as i64;
    let pad_y = (margin * h as f32) as i64;

    let x0 = (x - pad_x).max(0);
    let y0 = (y - pad_y).max(0);
    let x1 = (x + w + pad_x).min(image_width as i64);
    let y1 = (y + h + pad_y).min(image_height as i64);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(CropRect {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}

/// Crop `rect` out of `image` and resize it to the embedder input size.
pub fn crop_face(image: &RgbImage, rect: CropRect) -> FaceCrop {
    let region = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();
    let resized = imageops::resize(&region, FACE_CROP_SIZE, FACE_CROP_SIZE, CROP_FILTER);
    FaceCrop::from_resized(resized)
}

/// Detect faces in `image` and return a crop of the largest one.
pub fn locate_face(
    detector: &mut dyn Detector,
    image: &RgbImage,
    margin: f32,
) -> Result<FaceLocation, DetectorError> {
    let faces = detector.detect(image)?;

    let Some(face) = select_largest(&faces) else {
        tracing::debug!("no face detected");
        return Ok(FaceLocation::NotFound { reason: NO_FACE_REASON.to_string() });
    };

    if faces.len() > 1 {
        tracing::debug!(count = faces.len(), area = face.area(), "multiple faces, using largest");
    }

    let Some(rect) = expand_box(face, margin, image.width(), image.height()) else {
        tracing::debug!(?face, "face box degenerates after clamping");
        return Ok(FaceLocation::NotFound { reason: DEGENERATE_FACE_REASON.to_string() });
    };

    Ok(FaceLocation::Found {
        crop: crop_face(image, rect),
        confidence: face.confidence,
    })
}
