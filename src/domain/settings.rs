use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// User-facing sweep parameters. Every other number involved in a sweep is a
/// calibration constant of the peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub quality_index: u8,
    #[serde(default = "default_false")]
    pub auto_exposure: bool,
    /// Per-cell wait for the photo after the settings were sent
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,
    /// After a timeout, how long to wait for and discard the overdue photo
    #[serde(default = "default_late_payload_grace_ms")]
    pub late_payload_grace_ms: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            size: default_size(),
            quality_index: 0,
            auto_exposure: false,
            capture_timeout_ms: default_capture_timeout_ms(),
            late_payload_grace_ms: default_late_payload_grace_ms(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "exposure_sweep".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_size() -> u32 {
    5
}
fn default_capture_timeout_ms() -> u64 {
    3000
}
fn default_late_payload_grace_ms() -> u64 {
    1000
}
fn default_export_dir() -> String {
    "captures".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub sweep: SweepSettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    /// Where exported mosaics are written
    #[serde(default = "default_export_dir")]
    pub export_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sweep: SweepSettings::default(),
            log_settings: LogSettings::default(),
            export_dir: default_export_dir(),
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::load(settings_path))
    }

    /// Load from `path`, falling back to defaults when it is missing or unreadable
    pub fn load(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ExposureSweep");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)
            .with_context(|| format!("Could not write {}", self.settings_path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
