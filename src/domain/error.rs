//! Error types for the sweep pipeline.
//!
//! Per-cell errors ([`TransportError`], [`DecodeError`], wrapped in
//! [`CellError`]) are recovered inside the sequencer. [`CompositeError`] and
//! [`GridError`] abort a sweep and surface through [`SweepError`].

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("grid size must be at least 2, got {0}")]
    SizeTooSmall(u32),
    #[error("grid size must be at most {max}, got {size}")]
    SizeTooLarge { size: u32, max: u32 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to send capture settings: {0}")]
    Send(String),
    #[error("no payload received within {0:?}")]
    Timeout(Duration),
    #[error("payload stream closed")]
    Closed,
}

#[derive(Debug, Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

#[derive(Debug, Error)]
pub enum CellError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("expected {expected} cells, got {actual}")]
    CellCount { expected: usize, actual: usize },
    #[error("cell {index} is {actual:?}, expected {expected:?}")]
    CellShape {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("failed to encode mosaic: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error("compositing worker failed: {0}")]
    Worker(String),
}
