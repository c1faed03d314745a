//! Sweep domain: grid generation, capture sequencing, decoding and mosaic
//! assembly, plus the controller that ties them together.

pub mod compositor;
pub mod decoder;
pub mod error;
pub mod grid;
pub mod models;
pub mod sequencer;
pub mod settings;
pub mod sweep;
