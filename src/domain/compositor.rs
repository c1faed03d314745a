//! Mosaic assembly
//!
//! Cells arrive in row-major order and must all share the same dimensions.
//! Cell `(row, col)` lands with its top-left corner at
//! `(col * cell_width, row * cell_height)`.

use crate::domain::error::CompositeError;
use crate::domain::models::Mosaic;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, RgbImage};
use std::borrow::Borrow;
use tracing::debug;

pub const MOSAIC_MIME: &str = "image/jpeg";
pub const MOSAIC_JPEG_QUALITY: u8 = 90;

/// Assemble `size × size` cells into one mosaic and encode it. Cells may be
/// owned or borrowed bitmaps.
pub fn compose<C: Borrow<RgbImage>>(cells: &[C], size: u32) -> Result<Mosaic, CompositeError> {
    let expected = (size as usize) * (size as usize);
    if size == 0 || cells.len() != expected {
        return Err(CompositeError::CellCount {
            expected,
            actual: cells.len(),
        });
    }

    let cells: Vec<&RgbImage> = cells.iter().map(<C as Borrow<RgbImage>>::borrow).collect();
    let cell_dims = cells[0].dimensions();
    if let Some((index, cell)) = cells
        .iter()
        .enumerate()
        .find(|(_, cell)| cell.dimensions() != cell_dims)
    {
        return Err(CompositeError::CellShape {
            index,
            expected: cell_dims,
            actual: cell.dimensions(),
        });
    }

    let (cell_width, cell_height) = cell_dims;
    let mut canvas = RgbImage::new(size * cell_width, size * cell_height);

    for (i, &cell) in cells.iter().enumerate() {
        let row = i as u32 / size;
        let col = i as u32 % size;
        imageops::replace(
            &mut canvas,
            cell,
            (col * cell_width) as i64,
            (row * cell_height) as i64,
        );
    }

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, MOSAIC_JPEG_QUALITY).encode_image(&canvas)?;

    debug!(
        "Composed {}x{} mosaic ({} bytes)",
        canvas.width(),
        canvas.height(),
        encoded.len()
    );

    Ok(Mosaic {
        image: canvas,
        encoded,
        mime: MOSAIC_MIME,
    })
}
