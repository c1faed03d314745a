use crate::domain::error::CellError;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Lowest shutter value the peripheral accepts.
pub const SHUTTER_MIN: u32 = 4;
/// Upper end of the log-spaced shutter axis.
pub const SHUTTER_AXIS_MAX: u32 = 16383;
/// Shutter values are clamped to this before being sent.
pub const SHUTTER_CLAMP_MAX: u32 = 16343;
/// Highest legal analog gain.
pub const GAIN_MAX: u32 = 248;
/// Neutral white-balance channel gain.
pub const DEFAULT_CHANNEL_GAIN: u8 = 128;
/// Size of the blank bitmap substituted for a failed cell.
pub const PLACEHOLDER_SIZE: u32 = 512;

/// One (gain, shutter) coordinate of the sweep grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub gain: u32,
    pub shutter: u32,
}

impl GridCell {
    /// Row-major position of this cell in a grid of `size` columns
    pub fn index(&self, size: u32) -> usize {
        self.row as usize * size as usize + self.col as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeteringMode {
    CenterWeighted,
}

/// Fixed auto-exposure profile of the peripheral
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutoExposureProfile {
    pub exposure_target: f32,
    pub exposure_speed: f32,
    pub metering: MeteringMode,
    pub auto_run_count: u8,
}

impl Default for AutoExposureProfile {
    fn default() -> Self {
        Self {
            exposure_target: 0.18,
            exposure_speed: 0.5,
            metering: MeteringMode::CenterWeighted,
            auto_run_count: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Exposure {
    Manual { gain: u32, shutter: u32 },
    Auto(AutoExposureProfile),
}

/// Settings sent to the peripheral for a single capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub quality_index: u8,
    pub exposure: Exposure,
    pub red_gain: u8,
    pub green_gain: u8,
    pub blue_gain: u8,
}

impl CaptureSettings {
    pub fn for_cell(cell: &GridCell, quality_index: u8, auto_exposure: bool) -> Self {
        let exposure = if auto_exposure {
            Exposure::Auto(AutoExposureProfile::default())
        } else {
            Exposure::Manual {
                gain: cell.gain,
                shutter: cell.shutter,
            }
        };

        Self {
            quality_index,
            exposure,
            red_gain: DEFAULT_CHANNEL_GAIN,
            green_gain: DEFAULT_CHANNEL_GAIN,
            blue_gain: DEFAULT_CHANNEL_GAIN,
        }
    }

    pub fn auto_exposure(&self) -> bool {
        matches!(self.exposure, Exposure::Auto(_))
    }
}

#[derive(Debug)]
pub enum CaptureStatus {
    Ok,
    Failed(CellError),
}

/// Outcome of one grid cell. A failed cell still carries a placeholder bitmap.
#[derive(Debug)]
pub struct CaptureResult {
    pub cell: GridCell,
    pub status: CaptureStatus,
    pub bitmap: RgbImage,
}

impl CaptureResult {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, CaptureStatus::Ok)
    }
}

/// Entry of the per-cell failure log kept after a sweep
#[derive(Debug, Clone, Serialize)]
pub struct CellFailure {
    pub index: usize,
    pub cell: GridCell,
    pub reason: String,
}

/// Composite of every cell plus its encoded form
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub image: RgbImage,
    pub encoded: Vec<u8>,
    pub mime: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Running,
    Ready(SweepStatus),
}

/// Mosaic kept in the controller's run history
#[derive(Debug, Clone)]
pub struct MosaicRecord {
    pub run: u32,
    pub size: u32,
    pub elapsed: Duration,
    pub width: u32,
    pub height: u32,
    pub encoded: Arc<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum SweepEvent {
    StateChanged(SweepState),
    CellCompleted {
        index: usize,
        total: usize,
        cell: GridCell,
        ok: bool,
    },
    Log(StatusMessage),
    MosaicReady {
        width: u32,
        height: u32,
        bytes: Arc<Vec<u8>>,
    },
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
