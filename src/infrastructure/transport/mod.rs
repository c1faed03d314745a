//! Capture Transport Module
//!
//! Boundary between the sweep and the peripheral link.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  send(settings)   ┌──────────────────────┐
//! │ CaptureSequencer │ ────────────────▶ │   CaptureTransport   │
//! │                  │                   │ (BLE, sim, replay)   │
//! │  PayloadListener │ ◀──────────────── │     PayloadHub       │
//! └──────────────────┘   one payload     └──────────────────────┘
//! ```
//!
//! The link is half-duplex: one command out, one payload back, and nothing
//! correlates the two. A listener is subscribed before each send and is
//! consumed by the wait. A reply that misses its deadline is drained by the
//! sequencer before the next send.
//!
//! ## Modules
//!
//! - [`simulated`] - In-process camera with fault injection
//! - [`replay`] - Replays encoded images from a directory

pub mod replay;
pub mod simulated;

use crate::domain::error::TransportError;
use crate::domain::models::CaptureSettings;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::warn;

pub use replay::ReplayTransport;
pub use simulated::SimulatedCamera;

/// Inbound payloads buffered per listener
const PAYLOAD_CHANNEL_CAPACITY: usize = 8;

/// A peripheral that accepts capture settings and streams back encoded images
pub trait CaptureTransport: Send + Sync {
    /// Completes once the settings are sent, not when the photo arrives
    fn send(
        &self,
        settings: &CaptureSettings,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribe to the inbound payload stream
    fn payloads(&self) -> PayloadListener;
}

/// Fan-out of inbound payloads to whoever is currently listening.
///
/// Payloads published while nobody listens are dropped.
#[derive(Debug, Clone)]
pub struct PayloadHub {
    sender: broadcast::Sender<Vec<u8>>,
}

impl PayloadHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(PAYLOAD_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish one payload, returning how many listeners received it
    pub fn publish(&self, payload: Vec<u8>) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }

    pub fn subscribe(&self) -> PayloadListener {
        PayloadListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for PayloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-use subscription to a transport's payload stream
#[derive(Debug)]
pub struct PayloadListener {
    receiver: broadcast::Receiver<Vec<u8>>,
}

impl PayloadListener {
    /// Wait for exactly one payload. The listener is dropped (unsubscribed)
    /// whether the wait succeeds, times out, or the stream closes.
    pub async fn next_payload(mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.receiver.recv()).await {
                Err(_) => return Err(TransportError::Timeout(timeout)),
                Ok(Ok(payload)) => return Ok(payload),
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(TransportError::Closed)
                }
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!("Payload listener lagged, skipped {} payloads", skipped);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listener_receives_one_payload() {
        let hub = PayloadHub::new();
        let listener = hub.subscribe();

        assert_eq!(hub.publish(vec![1, 2, 3]), 1);
        hub.publish(vec![4, 5, 6]);

        let payload = listener
            .next_payload(Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_listener_times_out_and_unsubscribes() {
        let hub = PayloadHub::new();
        let listener = hub.subscribe();
        assert_eq!(hub.listener_count(), 1);

        let result = listener.next_payload(Duration::from_millis(20)).await;
        assert_eq!(
            result,
            Err(TransportError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_payload_without_listener_is_dropped() {
        let hub = PayloadHub::new();
        assert_eq!(hub.publish(vec![9]), 0);

        // A later listener never sees the stale payload
        let listener = hub.subscribe();
        let result = listener.next_payload(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let hub = PayloadHub::new();
        let listener = hub.subscribe();
        drop(hub);

        let result = listener.next_payload(Duration::from_millis(20)).await;
        assert_eq!(result, Err(TransportError::Closed));
    }
}
