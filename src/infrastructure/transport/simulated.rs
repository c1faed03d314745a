//! Simulated camera peripheral
//!
//! Answers each capture request with a synthetic JPEG whose brightness
//! follows the requested gain and shutter. Faults can be injected per
//! request index to exercise the sequencer's recovery paths.

use super::{CaptureTransport, PayloadHub, PayloadListener};
use crate::domain::error::TransportError;
use crate::domain::models::{CaptureSettings, Exposure, GAIN_MAX, SHUTTER_AXIS_MAX};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, trace};

/// Sensor frame size before orientation correction
pub const DEFAULT_FRAME_WIDTH: u32 = 32;
pub const DEFAULT_FRAME_HEIGHT: u32 = 24;

/// Fault injected for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The send itself fails
    SendError,
    /// The send succeeds but no photo ever arrives
    NoPayload,
    /// A payload arrives that is not a valid image
    CorruptPayload,
    /// The photo is published only after the given delay
    LatePayload(Duration),
}

type RequestHook = Box<dyn Fn(usize) + Send + Sync>;

pub struct SimulatedCamera {
    hub: PayloadHub,
    requests: AtomicUsize,
    sent: Mutex<Vec<CaptureSettings>>,
    faults: HashMap<usize, Fault>,
    response_delay: Duration,
    frame_size: (u32, u32),
    on_request: Option<RequestHook>,
}

impl SimulatedCamera {
    pub fn new() -> Self {
        Self {
            hub: PayloadHub::new(),
            requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            faults: HashMap::new(),
            response_delay: Duration::ZERO,
            frame_size: (DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT),
            on_request: None,
        }
    }

    /// Inject `fault` on the request with the given zero-based index
    pub fn with_fault(mut self, request: usize, fault: Fault) -> Self {
        self.faults.insert(request, fault);
        self
    }

    /// Publish photos after a delay instead of immediately
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Run `hook` with the request index whenever a capture is requested
    pub fn on_request(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_request = Some(Box::new(hook));
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Every settings this camera was asked to capture with, in order
    pub fn sent_settings(&self) -> Vec<CaptureSettings> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    fn render(&self, settings: &CaptureSettings) -> Option<Vec<u8>> {
        let level = exposure_level(settings);
        let (width, height) = self.frame_size;

        let mut frame = RgbImage::from_pixel(width, height, Rgb([level, level, level]));
        // Orientation marker in the sensor's top-left corner
        frame.put_pixel(0, 0, Rgb([255, 0, 0]));

        let quality = 95u8.saturating_sub(settings.quality_index.saturating_mul(10)).max(10);
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality)
            .encode_image(&frame)
            .ok()?;
        Some(bytes)
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

/// Grey level the simulated sensor produces for the given exposure
pub fn exposure_level(settings: &CaptureSettings) -> u8 {
    match settings.exposure {
        Exposure::Manual { gain, shutter } => {
            let shutter_norm = (shutter.max(1) as f64).ln() / (SHUTTER_AXIS_MAX as f64).ln();
            let gain_boost = 1.0 + gain as f64 / GAIN_MAX as f64;
            (shutter_norm * gain_boost * 160.0).clamp(0.0, 255.0) as u8
        }
        Exposure::Auto(profile) => (profile.exposure_target.sqrt() * 255.0).round() as u8,
    }
}

impl CaptureTransport for SimulatedCamera {
    async fn send(&self, settings: &CaptureSettings) -> Result<(), TransportError> {
        let index = self.requests.fetch_add(1, Ordering::SeqCst);
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(*settings);
        if let Some(hook) = &self.on_request {
            hook(index);
        }

        let mut delay = self.response_delay;
        let payload = match self.faults.get(&index) {
            Some(Fault::SendError) => {
                debug!("Simulated send failure on request {}", index);
                return Err(TransportError::Send(format!(
                    "simulated link error on request {}",
                    index
                )));
            }
            Some(Fault::NoPayload) => None,
            Some(Fault::CorruptPayload) => Some(b"\xFF\xD8\xFF\xE0 corrupted frame".to_vec()),
            Some(Fault::LatePayload(late)) => {
                delay = *late;
                self.render(settings)
            }
            None => self.render(settings),
        };

        let Some(payload) = payload else {
            debug!("Simulated camera drops photo for request {}", index);
            return Ok(());
        };

        trace!("Simulated photo for request {}: {} bytes", index, payload.len());
        if delay.is_zero() {
            self.hub.publish(payload);
        } else {
            let hub = self.hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                hub.publish(payload);
            });
        }

        Ok(())
    }

    fn payloads(&self) -> PayloadListener {
        self.hub.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GridCell;

    fn settings(gain: u32, shutter: u32) -> CaptureSettings {
        let cell = GridCell {
            row: 0,
            col: 0,
            gain,
            shutter,
        };
        CaptureSettings::for_cell(&cell, 0, false)
    }

    #[tokio::test]
    async fn test_send_publishes_decodable_photo() {
        let camera = SimulatedCamera::new();
        let listener = camera.payloads();

        camera.send(&settings(0, 256)).await.unwrap();
        let payload = listener
            .next_payload(Duration::from_millis(100))
            .await
            .unwrap();

        let frame = image::load_from_memory(&payload).unwrap();
        assert_eq!(frame.width(), DEFAULT_FRAME_WIDTH);
        assert_eq!(frame.height(), DEFAULT_FRAME_HEIGHT);
        assert_eq!(camera.request_count(), 1);
        assert_eq!(camera.sent_settings(), vec![settings(0, 256)]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let camera = SimulatedCamera::new()
            .with_fault(0, Fault::SendError)
            .with_fault(1, Fault::NoPayload)
            .with_fault(2, Fault::CorruptPayload);

        assert!(matches!(
            camera.send(&settings(0, 4)).await,
            Err(TransportError::Send(_))
        ));

        let listener = camera.payloads();
        camera.send(&settings(0, 4)).await.unwrap();
        assert!(matches!(
            listener.next_payload(Duration::from_millis(20)).await,
            Err(TransportError::Timeout(_))
        ));

        let listener = camera.payloads();
        camera.send(&settings(0, 4)).await.unwrap();
        let payload = listener
            .next_payload(Duration::from_millis(20))
            .await
            .unwrap();
        assert!(image::load_from_memory(&payload).is_err());
    }

    #[tokio::test]
    async fn test_late_payload_fault() {
        let camera =
            SimulatedCamera::new().with_fault(0, Fault::LatePayload(Duration::from_millis(60)));

        let listener = camera.payloads();
        camera.send(&settings(0, 4)).await.unwrap();
        assert!(matches!(
            listener.next_payload(Duration::from_millis(20)).await,
            Err(TransportError::Timeout(_))
        ));

        let listener = camera.payloads();
        let payload = listener
            .next_payload(Duration::from_millis(500))
            .await
            .unwrap();
        assert!(image::load_from_memory(&payload).is_ok());
    }

    #[test]
    fn test_sent_settings_survive_poisoned_lock() {
        let camera = SimulatedCamera::new();
        camera.sent.lock().unwrap().push(settings(0, 4));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = camera.sent.lock().unwrap();
            panic!("poison");
        }));
        assert!(camera.sent.is_poisoned());
        assert_eq!(camera.sent_settings(), vec![settings(0, 4)]);
    }

    #[test]
    fn test_brightness_grows_with_exposure() {
        let dark = exposure_level(&settings(0, 4));
        let mid = exposure_level(&settings(0, 256));
        let bright = exposure_level(&settings(248, 16343));
        assert!(dark < mid);
        assert!(mid < bright);
    }
}
