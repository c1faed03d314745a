//! Sweep Controller
//!
//! Top-level state machine for one calibration sweep:
//! `Idle → Running → Ready(Completed | Cancelled | Failed)`.
//! Generates the grid, runs the capture sequencer, then assembles the
//! mosaic on the blocking pool. Owns the per-run mosaic history.

use crate::domain::compositor;
use crate::domain::decoder;
use crate::domain::error::SweepError;
use crate::domain::grid;
use crate::domain::models::{
    CaptureResult, CaptureStatus, CellFailure, MessageSeverity, Mosaic, MosaicRecord,
    StatusMessage, SweepEvent, SweepState, SweepStatus,
};
use crate::domain::sequencer::{CancelToken, CaptureSequencer, SequencerConfig};
use crate::domain::settings::SweepSettings;
use crate::infrastructure::transport::CaptureTransport;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Everything a finished sweep hands back to the caller
#[derive(Debug)]
pub struct SweepReport {
    pub status: SweepStatus,
    pub results: Vec<CaptureResult>,
    pub failures: Vec<CellFailure>,
    pub mosaic: Option<Mosaic>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// Cloneable view of a controller used to observe state and cancel a run
#[derive(Debug, Clone)]
pub struct SweepHandle {
    cancel: CancelToken,
    state: watch::Receiver<SweepState>,
}

impl SweepHandle {
    /// Request cancellation. Only has an effect while a sweep is running;
    /// the cell in flight still completes.
    pub fn cancel(&self) -> bool {
        if *self.state.borrow() != SweepState::Running {
            return false;
        }
        self.cancel.cancel();
        true
    }

    pub fn state(&self) -> SweepState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SweepState> {
        self.state.clone()
    }
}

pub struct SweepController {
    state: watch::Sender<SweepState>,
    cancel: CancelToken,
    events: Option<mpsc::UnboundedSender<SweepEvent>>,
    history: Vec<MosaicRecord>,
    runs: u32,
}

impl SweepController {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SweepState::Idle);
        Self {
            state,
            cancel: CancelToken::new(),
            events: None,
            history: Vec::new(),
            runs: 0,
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<SweepEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn handle(&self) -> SweepHandle {
        SweepHandle {
            cancel: self.cancel.clone(),
            state: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> SweepState {
        *self.state.borrow()
    }

    /// Mosaics of every completed run, oldest first
    pub fn history(&self) -> &[MosaicRecord] {
        &self.history
    }

    /// Run one full sweep. Never fails outright: whole-sweep errors are
    /// reported as [`SweepStatus::Failed`].
    pub async fn run<T: CaptureTransport>(
        &mut self,
        transport: &T,
        settings: &SweepSettings,
    ) -> SweepReport {
        let started = Instant::now();
        self.runs += 1;
        self.cancel.reset();
        self.set_state(SweepState::Running);
        info!(
            "Starting sweep #{}: {}x{} grid, auto_exposure={}",
            self.runs, settings.size, settings.size, settings.auto_exposure
        );

        let cells = match grid::generate(settings.size) {
            Ok(cells) => cells,
            Err(e) => return self.fail(SweepError::from(e), Vec::new(), Vec::new(), started),
        };

        let config = SequencerConfig {
            quality_index: settings.quality_index,
            auto_exposure: settings.auto_exposure,
            capture_timeout: Duration::from_millis(settings.capture_timeout_ms),
            late_payload_grace: Duration::from_millis(settings.late_payload_grace_ms),
        };
        let mut sequencer = CaptureSequencer::new(transport, config, self.cancel.clone());
        if let Some(events) = &self.events {
            sequencer = sequencer.with_events(events.clone());
        }
        let outcome = sequencer.run(&cells).await;
        let failures = failure_log(&outcome.results, settings.size);

        if outcome.cancelled {
            self.log(
                format!(
                    "Sweep cancelled after {} of {} cells",
                    outcome.results.len(),
                    cells.len()
                ),
                MessageSeverity::Warning,
            );
            self.set_state(SweepState::Ready(SweepStatus::Cancelled));
            return SweepReport {
                status: SweepStatus::Cancelled,
                results: outcome.results,
                failures,
                mosaic: None,
                error: None,
                elapsed: started.elapsed(),
            };
        }

        let size = settings.size;
        let (results, composed) = match tokio::task::spawn_blocking(move || {
            let composed = compose_results(&outcome.results, size);
            (outcome.results, composed)
        })
        .await
        {
            Ok(joined) => joined,
            Err(e) => {
                let err = SweepError::Worker(e.to_string());
                return self.fail(err, Vec::new(), failures, started);
            }
        };

        let mosaic = match composed {
            Ok(mosaic) => mosaic,
            Err(e) => return self.fail(e.into(), results, failures, started),
        };

        let elapsed = started.elapsed();
        let encoded = Arc::new(mosaic.encoded.clone());
        self.history.push(MosaicRecord {
            run: self.runs,
            size,
            elapsed,
            width: mosaic.image.width(),
            height: mosaic.image.height(),
            encoded: encoded.clone(),
        });
        if let Some(events) = &self.events {
            let _ = events.send(SweepEvent::MosaicReady {
                width: mosaic.image.width(),
                height: mosaic.image.height(),
                bytes: encoded,
            });
        }

        self.log(
            format!(
                "Sweep finished in {:.1}s with {} failed cells",
                elapsed.as_secs_f64(),
                failures.len()
            ),
            if failures.is_empty() {
                MessageSeverity::Success
            } else {
                MessageSeverity::Warning
            },
        );
        self.set_state(SweepState::Ready(SweepStatus::Completed));

        SweepReport {
            status: SweepStatus::Completed,
            results,
            failures,
            mosaic: Some(mosaic),
            error: None,
            elapsed,
        }
    }

    fn fail(
        &self,
        err: SweepError,
        results: Vec<CaptureResult>,
        failures: Vec<CellFailure>,
        started: Instant,
    ) -> SweepReport {
        self.log(format!("Sweep failed: {}", err), MessageSeverity::Error);
        self.set_state(SweepState::Ready(SweepStatus::Failed));

        SweepReport {
            status: SweepStatus::Failed,
            results,
            failures,
            mosaic: None,
            error: Some(err.to_string()),
            elapsed: started.elapsed(),
        }
    }

    fn set_state(&self, next: SweepState) {
        self.state.send_replace(next);
        if let Some(events) = &self.events {
            let _ = events.send(SweepEvent::StateChanged(next));
        }
    }

    fn log(&self, message: String, severity: MessageSeverity) {
        match severity {
            MessageSeverity::Error => error!("{}", message),
            MessageSeverity::Warning => warn!("{}", message),
            MessageSeverity::Info | MessageSeverity::Success => info!("{}", message),
        }
        if let Some(events) = &self.events {
            let _ = events.send(SweepEvent::Log(StatusMessage { message, severity }));
        }
    }
}

impl Default for SweepController {
    fn default() -> Self {
        Self::new()
    }
}

fn failure_log(results: &[CaptureResult], size: u32) -> Vec<CellFailure> {
    results
        .iter()
        .filter_map(|result| match &result.status {
            CaptureStatus::Failed(reason) => Some(CellFailure {
                index: result.cell.index(size),
                cell: result.cell,
                reason: reason.to_string(),
            }),
            CaptureStatus::Ok => None,
        })
        .collect()
}

/// Placeholders are resized to the first decoded cell so every tile matches.
/// Decoded bitmaps are borrowed, not copied.
fn compose_results(results: &[CaptureResult], size: u32) -> Result<Mosaic, SweepError> {
    let placeholder: Option<RgbImage> = results
        .iter()
        .find(|r| r.is_ok())
        .map(|r| r.bitmap.dimensions())
        .map(|(width, height)| decoder::placeholder_sized(width, height));

    let cells: Vec<&RgbImage> = results
        .iter()
        .map(|result| match (&result.status, &placeholder) {
            (CaptureStatus::Failed(_), Some(resized)) => resized,
            _ => &result.bitmap,
        })
        .collect();

    Ok(compositor::compose(&cells, size)?)
}
