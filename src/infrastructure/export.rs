//! Export collaborator
//!
//! Takes an encoded image buffer plus its MIME type and puts it somewhere a
//! person can get at it. The sweep only ever hands over bytes.

use crate::domain::models::CellFailure;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

pub trait Exporter {
    /// Export `bytes`, returning where they ended up
    fn export(&self, bytes: &[u8], mime: &str) -> Result<PathBuf>;
}

/// Writes exports as timestamped files in one directory
pub struct FileExporter {
    dir: PathBuf,
    prefix: String,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prefix: "sweep".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Write the per-cell failure log next to an exported mosaic
    pub fn export_failures(&self, mosaic_path: &Path, failures: &[CellFailure]) -> Result<PathBuf> {
        let path = mosaic_path.with_extension("failures.json");
        let json = serde_json::to_string_pretty(failures)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Could not write {}", path.display()))?;
        Ok(path)
    }

    fn file_name(&self, mime: &str) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        format!("{}_{}.{}", self.prefix, millis, extension_for(mime))
    }
}

impl Exporter for FileExporter {
    fn export(&self, bytes: &[u8], mime: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Could not create {}", self.dir.display()))?;

        let path = self.dir.join(self.file_name(mime));
        std::fs::write(&path, bytes)
            .with_context(|| format!("Could not write {}", path.display()))?;

        info!("Exported {} bytes ({}) to {}", bytes.len(), mime, path.display());
        Ok(path)
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GridCell;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "exposure_sweep_export_{}_{}",
            name,
            std::process::id()
        ))
    }

    #[test]
    fn test_export_writes_bytes_with_extension() {
        let dir = scratch_dir("bytes");
        let exporter = FileExporter::new(&dir).with_prefix("mosaic");

        let path = exporter.export(b"jpeg bytes", "image/jpeg").unwrap();

        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap()
            .starts_with("mosaic_"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg bytes");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failure_log_sits_next_to_mosaic() {
        let dir = scratch_dir("failures");
        let exporter = FileExporter::new(&dir);
        let mosaic = exporter.export(b"x", "image/jpeg").unwrap();

        let failures = vec![CellFailure {
            index: 4,
            cell: GridCell {
                row: 1,
                col: 1,
                gain: 124,
                shutter: 256,
            },
            reason: "no payload received within 3s".to_string(),
        }];
        let log = exporter.export_failures(&mosaic, &failures).unwrap();

        assert!(log.to_str().unwrap().ends_with(".failures.json"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&log).unwrap()).unwrap();
        assert_eq!(json[0]["index"], 4);
        assert_eq!(json[0]["cell"]["shutter"], 256);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_unknown_mime_falls_back_to_bin() {
        assert_eq!(extension_for("application/octet-stream"), "bin");
        assert_eq!(extension_for("image/png"), "png");
    }
}
