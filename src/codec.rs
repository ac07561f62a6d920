//! Image bytes in, image bytes out.

use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::DetectError;

/// JPEG quality used when nothing else is configured.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decode uploaded or file bytes (any format the image crate was built
/// with) into an RGB frame.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DetectError> {
    if bytes.is_empty() {
        return Err(DetectError::Decode("empty input".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|err| DetectError::Decode(err.to_string()))
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder
        .encode_image(frame)
        .context("failed to encode frame as JPEG")?;
    Ok(out.into_inner())
}

pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
