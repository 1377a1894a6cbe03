//! Base64 image payload decoding.
//!
//! Accepts raw base64 or a data URL (`data:image/jpeg;base64,...`) and
//! always yields an 8-bit RGB raster.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid image data: {0}")]
    Image(#[from] image::ImageError),
}

/// Strip an optional data-URL header: everything up to the first comma.
fn strip_data_url(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

/// Decode a base64 (optionally data-URL prefixed) image into RGB.
///
/// The container format is sniffed from the bytes; grayscale, alpha and
/// 16-bit sources are all converted to 3-channel 8-bit RGB.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage, DecodeError> {
    let data = strip_data_url(payload).trim();
    let bytes = STANDARD.decode(data)?;
    let image = image::load_from_memory(&bytes)?;

    tracing::trace!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image payload"
    );

    Ok(image.to_rgb8())
}
