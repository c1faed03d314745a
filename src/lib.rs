//! Exposure sweep calibration controller.
//!
//! Drives a camera peripheral through an N×N grid of analog gain × shutter
//! settings, one capture per cell over a half-duplex transport, and stitches
//! the captures into a single mosaic.

pub mod domain;
pub mod infrastructure;
pub mod presentation;
