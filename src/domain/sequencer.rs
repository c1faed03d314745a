//! Capture Sequencer
//!
//! Drives one capture per grid cell over a half-duplex transport. Each cell
//! is a strict request/response pair: subscribe, send, wait for exactly one
//! payload, unsubscribe, decode. Per-cell failures are recorded with a
//! placeholder bitmap and never stop the sequence.
//!
//! Payloads carry no request id. When a cell times out, its reply may still
//! be on the way, so the sequencer waits up to `late_payload_grace` and
//! discards it before the next request goes out.
//!
//! ```text
//! Idle ─▶ Requesting ─▶ AwaitingPayload ─▶ Decoding ─▶ Idle ─▶ ... ─▶ Done
//!   │                                                   │
//!   └──────────── cancel observed between cells ────────┴─▶ Cancelled
//! ```

use crate::domain::decoder;
use crate::domain::error::{CellError, TransportError};
use crate::domain::models::{CaptureResult, CaptureSettings, CaptureStatus, GridCell, SweepEvent};
use crate::infrastructure::transport::{CaptureTransport, PayloadListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    pub quality_index: u8,
    pub auto_exposure: bool,
    /// How long to wait for the photo after the settings are sent
    pub capture_timeout: Duration,
    /// After a timeout, how long to keep listening for the overdue photo
    pub late_payload_grace: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            quality_index: 0,
            auto_exposure: false,
            capture_timeout: Duration::from_millis(3000),
            late_payload_grace: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    Requesting(GridCell),
    AwaitingPayload(GridCell),
    Decoding(GridCell),
    Done,
    Cancelled,
}

/// Cooperative cancellation flag, checked only between cells
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Results of a sequencer run, in grid order
#[derive(Debug)]
pub struct SequenceOutcome {
    pub results: Vec<CaptureResult>,
    pub cancelled: bool,
}

pub struct CaptureSequencer<'a, T: CaptureTransport> {
    transport: &'a T,
    config: SequencerConfig,
    cancel: CancelToken,
    events: Option<mpsc::UnboundedSender<SweepEvent>>,
    state: SequencerState,
}

impl<'a, T: CaptureTransport> CaptureSequencer<'a, T> {
    pub fn new(transport: &'a T, config: SequencerConfig, cancel: CancelToken) -> Self {
        Self {
            transport,
            config,
            cancel,
            events: None,
            state: SequencerState::Idle,
        }
    }

    /// Report each completed cell on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SweepEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Capture every cell in order
    pub async fn run(&mut self, cells: &[GridCell]) -> SequenceOutcome {
        let total = cells.len();
        let mut results = Vec::with_capacity(total);
        info!("Capturing {} cells", total);

        for (index, cell) in cells.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Sweep cancelled after {} of {} cells", index, total);
                self.transition(SequencerState::Cancelled);
                return SequenceOutcome {
                    results,
                    cancelled: true,
                };
            }

            let result = self.capture(cell).await;
            self.transition(SequencerState::Idle);

            if let Some(events) = &self.events {
                let _ = events.send(SweepEvent::CellCompleted {
                    index,
                    total,
                    cell: *cell,
                    ok: result.is_ok(),
                });
            }
            results.push(result);
        }

        self.transition(SequencerState::Done);
        SequenceOutcome {
            results,
            cancelled: false,
        }
    }

    async fn capture(&mut self, cell: &GridCell) -> CaptureResult {
        match self.exchange(cell).await {
            Ok(bitmap) => CaptureResult {
                cell: *cell,
                status: CaptureStatus::Ok,
                bitmap,
            },
            Err(reason) => {
                warn!(
                    "Cell ({}, {}) gain={} shutter={} failed: {}",
                    cell.row, cell.col, cell.gain, cell.shutter, reason
                );
                CaptureResult {
                    cell: *cell,
                    status: CaptureStatus::Failed(reason),
                    bitmap: decoder::placeholder(),
                }
            }
        }
    }

    async fn exchange(&mut self, cell: &GridCell) -> Result<image::RgbImage, CellError> {
        let settings =
            CaptureSettings::for_cell(cell, self.config.quality_index, self.config.auto_exposure);

        self.transition(SequencerState::Requesting(*cell));
        // Subscribe before sending so a fast reply cannot slip past. The
        // second listener only matters if this cell times out.
        let listener = self.transport.payloads();
        let overdue = self.transport.payloads();
        self.transport.send(&settings).await?;

        self.transition(SequencerState::AwaitingPayload(*cell));
        let payload = match listener.next_payload(self.config.capture_timeout).await {
            Ok(payload) => payload,
            Err(e @ TransportError::Timeout(_)) => {
                self.drain_overdue(cell, overdue).await;
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        drop(overdue);

        self.transition(SequencerState::Decoding(*cell));
        Ok(decoder::decode(&payload)?)
    }

    /// Swallow the reply of a timed-out cell so the next cell cannot take it
    async fn drain_overdue(&self, cell: &GridCell, overdue: PayloadListener) {
        match overdue.next_payload(self.config.late_payload_grace).await {
            Ok(payload) => warn!(
                "Discarded late photo for cell ({}, {}): {} bytes",
                cell.row,
                cell.col,
                payload.len()
            ),
            Err(e) => debug!("No late photo for cell ({}, {}): {}", cell.row, cell.col, e),
        }
    }

    fn transition(&mut self, next: SequencerState) {
        debug!("Sequencer {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
