//! File replay transport
//!
//! Stands in for the peripheral by answering each request with the next
//! image file from a directory (sorted by name). Once the files run out no
//! payload is published and the waiting cell times out.

use super::{CaptureTransport, PayloadHub, PayloadListener};
use crate::domain::error::TransportError;
use crate::domain::models::CaptureSettings;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

const REPLAY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ReplayTransport {
    hub: PayloadHub,
    frames: Vec<PathBuf>,
    cursor: AtomicUsize,
}

impl ReplayTransport {
    /// Collect replayable image files from `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut frames = Vec::new();
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("Could not read replay directory {}", dir.display()))?
        {
            let path = entry?.path();
            let replayable = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| REPLAY_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && replayable {
                frames.push(path);
            }
        }
        frames.sort();

        info!("Replaying {} frames from {}", frames.len(), dir.display());
        Ok(Self {
            hub: PayloadHub::new(),
            frames,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl CaptureTransport for ReplayTransport {
    async fn send(&self, _settings: &CaptureSettings) -> Result<(), TransportError> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(path) = self.frames.get(index) else {
            warn!("Replay exhausted at request {}", index);
            return Ok(());
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::Send(format!("{}: {}", path.display(), e)))?;
        self.hub.publish(bytes);
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
    use std::time::Duration;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "exposure_sweep_replay_{}_{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_replays_frames_in_name_order() {
        let dir = scratch_dir("order");
        std::fs::write(dir.join("b.jpg"), b"second").unwrap();
        std::fs::write(dir.join("a.JPG"), b"first").unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let transport = ReplayTransport::from_dir(&dir).unwrap();
        assert_eq!(transport.frame_count(), 2);

        let settings = CaptureSettings::for_cell(
            &GridCell {
                row: 0,
                col: 0,
                gain: 0,
                shutter: 4,
            },
            0,
            false,
        );
        let timeout = Duration::from_millis(100);

        for expected in [&b"first"[..], &b"second"[..]] {
            let listener = transport.payloads();
            transport.send(&settings).await.unwrap();
            assert_eq!(listener.next_payload(timeout).await.unwrap(), expected);
        }

        let listener = transport.payloads();
        transport.send(&settings).await.unwrap();
        assert!(matches!(
            listener.next_payload(Duration::from_millis(20)).await,
            Err(TransportError::Timeout(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_directory() {
        assert!(ReplayTransport::from_dir(Path::new("/nonexistent/replay/dir")).is_err());
    }
}
