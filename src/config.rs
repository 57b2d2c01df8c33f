//! Configuration file handling for photobooth.
//!
//! Loads settings from `~/.config/photobooth/config.toml` or a custom path.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings file structure for photobooth.
/// Loaded from ~/.config/photobooth/config.toml (or custom path via --config).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub timing: TimingSettings,
    #[serde(default)]
    pub camera: CameraSettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSettings {
    /// Seconds counted down before the shutter fires.
    #[serde(default = "default_countdown_seconds")]
    pub countdown_seconds: u32,
    /// Seconds the captured photo stays on screen before returning to idle.
    #[serde(default = "default_review_seconds")]
    pub review_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraSettings {
    /// Use the synthetic camera instead of real hardware.
    #[serde(default)]
    pub use_synthetic: bool,
    /// Hardware camera device index.
    #[serde(default)]
    pub device: u32,
    #[serde(default = "default_preview_fps")]
    pub preview_fps: u32,
    #[serde(default = "default_auto")]
    pub iso: String,
    #[serde(default = "default_auto")]
    pub aperture: String,
    #[serde(default = "default_auto")]
    pub shutter_speed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    /// Queue each captured photo for upload automatically.
    #[serde(default = "default_true")]
    pub upload_on_capture: bool,
    /// Retries after the first failed attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delay between retry attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_true")]
    pub save_locally: bool,
    #[serde(default = "default_photos_dir")]
    pub photos_dir: PathBuf,
    /// `{timestamp}` expands to the capture time as YYYYMMDD_HHMMSS.
    #[serde(default = "default_filename_pattern")]
    pub filename_pattern: String,
}

fn default_true() -> bool {
    true
}

fn default_countdown_seconds() -> u32 {
    3
}

fn default_review_seconds() -> u32 {
    5
}

fn default_preview_fps() -> u32 {
    10
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_filename_pattern() -> String {
    "photo_{timestamp}.jpg".to_string()
}

fn default_photos_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join("Pictures")
        })
        .join("photobooth")
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            countdown_seconds: default_countdown_seconds(),
            review_seconds: default_review_seconds(),
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            use_synthetic: false,
            device: 0,
            preview_fps: default_preview_fps(),
            iso: default_auto(),
            aperture: default_auto(),
            shutter_speed: default_auto(),
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            upload_on_capture: default_true(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            save_locally: default_true(),
            photos_dir: default_photos_dir(),
            filename_pattern: default_filename_pattern(),
        }
    }
}

impl Settings {
    /// Load settings from a file path.
    /// Returns default settings if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
            let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                source: e,
            })?;
            Ok(settings.clamped())
        } else {
            Ok(Settings::default())
        }
    }

    /// Write settings to a file path, creating parent directories as needed.
    pub fn save(&self, path: Option<&Path>) -> Result<(), ConfigError> {
        let path = path.map(PathBuf::from).unwrap_or_else(default_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: path.clone(),
                source: e,
            })?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::Io { path, source: e })
    }

    /// Clamp timing and preview values into their operational ranges.
    /// Applied on load and whenever the kiosk accepts new settings.
    pub fn clamped(mut self) -> Self {
        self.timing.countdown_seconds = self.timing.countdown_seconds.clamp(1, 10);
        self.timing.review_seconds = self.timing.review_seconds.clamp(1, 30);
        self.camera.preview_fps = self.camera.preview_fps.clamp(5, 30);
        self
    }
}

/// Errors that can occur when loading or saving settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config file '{path}': {source}")]
    Serialize {
        path: PathBuf,
        source: toml::ser::Error,
    },
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("photobooth").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/photobooth/config.toml")
        })
}
