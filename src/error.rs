//! Error types for the capture pipeline

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Coarse classification for callers at the UI boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Audio(e) => e.kind(),
            Error::Config(e) => e.kind(),
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Recoverable driver error; the stream keeps running
    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Capture callback fault: {0}")]
    CallbackFault(String),

    #[error("A capture session is active")]
    SessionActive,

    #[error("Sample queue overflow: {0} block(s) dropped")]
    QueueOverflow(usize),
}

impl AudioError {
    /// Whether the error ends the capture session
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AudioError::StreamError(_) | AudioError::QueueOverflow(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AudioError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            AudioError::DeviceUnavailable(_) | AudioError::UnsupportedFormat(_) => {
                ErrorKind::DeviceUnavailable
            }
            AudioError::StreamError(_) => ErrorKind::StreamError,
            AudioError::CallbackFault(_) => ErrorKind::CallbackFault,
            AudioError::SessionActive => ErrorKind::SessionActive,
            AudioError::QueueOverflow(_) => ErrorKind::QueueOverflow,
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {name} '{value}': {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file IO failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

impl ConfigError {
    pub fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            ConfigError::Io(_) => ErrorKind::Io,
            ConfigError::Parse(_) | ConfigError::Serialize(_) | ConfigError::NoConfigDir => {
                ErrorKind::Config
            }
        }
    }
}

/// Error classification exposed across the configuration UI boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceNotFound,
    DeviceUnavailable,
    InvalidParameter,
    QueueOverflow,
    StreamError,
    CallbackFault,
    SessionActive,
    Config,
    Io,
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_passes_through_wrappers() {
        let err: Error = ConfigError::invalid("downsample", 0, "must be at least 1").into();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        assert_eq!(err.to_string(), "Configuration error: Invalid downsample '0': must be at least 1");

        let err: Error = AudioError::DeviceUnavailable("busy".into()).into();
        assert_eq!(err.kind(), ErrorKind::DeviceUnavailable);
    }

    #[test]
    fn test_only_stream_glitches_and_overflow_are_recoverable() {
        assert!(!AudioError::StreamError("xrun".into()).is_fatal());
        assert!(!AudioError::QueueOverflow(3).is_fatal());
        assert!(AudioError::DeviceUnavailable("unplugged".into()).is_fatal());
        assert!(AudioError::CallbackFault("boom".into()).is_fatal());
    }
}
