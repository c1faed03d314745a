//! Photo decoding
//!
//! The peripheral's sensor is mounted rotated, so every decoded frame is
//! turned three quarter-turns clockwise before it is used.

use crate::domain::error::DecodeError;
use crate::domain::models::PLACEHOLDER_SIZE;
use image::RgbImage;

/// Decode an encoded image payload into an upright RGB bitmap
pub fn decode(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(decoded.rotate270().to_rgb8())
}

/// Blank bitmap used in place of a cell that could not be captured
pub fn placeholder() -> RgbImage {
    placeholder_sized(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE)
}

pub fn placeholder_sized(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}
