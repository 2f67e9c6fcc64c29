//! Application configuration
//!
//! Persisted as TOML in the platform config directory. Missing fields fall
//! back to the defaults in [`crate::constants`].

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::constants::*;
use crate::error::ConfigError;

/// Name of the config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Capture and display parameters
///
/// `device_id = None` selects the backend's default input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_id: Option<String>,
    pub sample_rate: u32,
    pub downsample_factor: u32,
    pub window_length_ms: u32,
    pub refresh_interval_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            downsample_factor: DEFAULT_DOWNSAMPLE,
            window_length_ms: DEFAULT_WINDOW_LENGTH_MS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
        }
    }
}

impl CaptureConfig {
    /// Check every field and the derived display length
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "refresh_interval_ms",
                self.refresh_interval_ms,
                "must be a positive number of milliseconds",
            ));
        }
        if let Some(id) = &self.device_id {
            if id.trim().is_empty() {
                return Err(ConfigError::invalid("device_id", id, "must not be empty"));
            }
        }
        self.display_len().map(|_| ())
    }

    /// Rolling buffer length implied by window, rate and downsample factor
    pub fn display_len(&self) -> Result<usize, ConfigError> {
        display_len(self.window_length_ms, self.sample_rate, self.downsample_factor)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms as u64)
    }
}

/// `window_length_ms * sample_rate / (1000 * downsample)`, truncated
///
/// Fails when any input is zero, when the window holds no samples, or when
/// the result exceeds [`MAX_DISPLAY_SAMPLES`].
pub fn display_len(window_length_ms: u32, sample_rate: u32, downsample: u32) -> Result<usize, ConfigError> {
    if window_length_ms == 0 {
        return Err(ConfigError::invalid(
            "window_length_ms",
            window_length_ms,
            "must be a positive number of milliseconds",
        ));
    }
    if sample_rate == 0 {
        return Err(ConfigError::invalid("sample_rate", sample_rate, "must be a positive rate in Hz"));
    }
    if downsample == 0 {
        return Err(ConfigError::invalid("downsample_factor", downsample, "must be at least 1"));
    }

    let len = window_length_ms as u64 * sample_rate as u64 / (1000 * downsample as u64);
    if len == 0 {
        return Err(ConfigError::invalid(
            "window_length_ms",
            window_length_ms,
            format!(
                "a {} ms window at {} Hz with downsample {} holds no samples",
                window_length_ms, sample_rate, downsample
            ),
        ));
    }
    if len > MAX_DISPLAY_SAMPLES as u64 {
        return Err(ConfigError::invalid(
            "window_length_ms",
            window_length_ms,
            format!("display would hold {} samples, limit is {}", len, MAX_DISPLAY_SAMPLES),
        ));
    }

    Ok(len as usize)
}

/// Sample queue settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    /// Maximum pending blocks between callback and render tick
    pub capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub queue: QueueSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Default location of the config file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "live-scope")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location, or defaults if there is no file yet
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.capacity == 0 {
            return Err(ConfigError::invalid("queue.capacity", 0, "must hold at least one block"));
        }
        self.capture.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_len() {
        assert_eq!(display_len(1000, 44100, 1).unwrap(), 44100);
        assert_eq!(display_len(1000, 44100, 2).unwrap(), 22050);
        assert_eq!(display_len(30, 44100, 7).unwrap(), 189);
        assert!(display_len(1, 8000, 16).is_err());
        assert!(display_len(0, 44100, 1).is_err());
        assert!(display_len(1000, 0, 1).is_err());
        assert!(display_len(1000, 44100, 0).is_err());
        assert!(display_len(u32::MAX, u32::MAX, 1).is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [capture]
            sample_rate = 48000
            device_id = "input:USB Mic"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.sample_rate, 48000);
        assert_eq!(config.capture.device_id.as_deref(), Some("input:USB Mic"));
        assert_eq!(config.capture.window_length_ms, DEFAULT_WINDOW_LENGTH_MS);
        assert_eq!(config.queue.capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let err = AppConfig::from_toml_str("[capture]\ndownsample_factor = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "downsample_factor", .. }));

        let err = AppConfig::from_toml_str("[queue]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "queue.capacity", .. }));

        assert!(matches!(
            AppConfig::from_toml_str("[capture]\nsample_rate = \"fast\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join(format!("live-scope-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.capture.downsample_factor = 4;
        config.capture.refresh_interval_ms = 50;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
