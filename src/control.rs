//! Reconfiguration controller
//!
//! Owns the capture config, device binding, session, sample queue, rolling
//! buffer and render ticker. All mutation goes through the `set_*` methods,
//! which validate first and either apply a change completely or leave the
//! previous state untouched.
//!
//! Runs on the same thread as the render tick.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::audio::backend::CaptureBackend;
use crate::audio::device::{DeviceBinding, DeviceDescriptor, DeviceHandle};
use crate::audio::queue::{create_shared_queue, QueueStats, SharedSampleQueue};
use crate::audio::session::{CaptureSession, SessionState};
use crate::config::{AppConfig, CaptureConfig};
use crate::display::rolling::RollingBuffer;
use crate::display::ticker::{FrameSink, RenderTicker, TickReport};
use crate::error::{AudioError, ConfigError, Result};

/// Parameters the configuration UI can change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    WindowLength,
    SampleRate,
    Downsample,
    Device,
    RefreshInterval,
}

impl Parameter {
    fn config_name(self) -> &'static str {
        match self {
            Parameter::WindowLength => "window_length_ms",
            Parameter::SampleRate => "sample_rate",
            Parameter::Downsample => "downsample_factor",
            Parameter::Device => "device_id",
            Parameter::RefreshInterval => "refresh_interval_ms",
        }
    }
}

impl FromStr for Parameter {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "window" | "window_length" | "window_length_ms" => Ok(Parameter::WindowLength),
            "rate" | "samplerate" | "sample_rate" => Ok(Parameter::SampleRate),
            "downsample" | "downsample_factor" => Ok(Parameter::Downsample),
            "device" | "device_id" => Ok(Parameter::Device),
            "interval" | "refresh" | "refresh_interval" | "refresh_interval_ms" => {
                Ok(Parameter::RefreshInterval)
            }
            other => Err(ConfigError::invalid("parameter", other, "unknown parameter")),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_name())
    }
}

/// Parse UI text as a strictly positive integer
fn parse_positive(name: &'static str, raw: &str) -> std::result::Result<u32, ConfigError> {
    let value = raw.trim();
    let parsed: i64 = value
        .parse()
        .map_err(|_| ConfigError::invalid(name, value, "not a whole number"))?;
    if parsed <= 0 {
        return Err(ConfigError::invalid(name, value, "must be positive"));
    }
    u32::try_from(parsed).map_err(|_| ConfigError::invalid(name, value, "too large"))
}

/// The capture pipeline and its single mutation surface
pub struct ScopeController {
    config: CaptureConfig,
    binding: DeviceBinding,
    session: CaptureSession,
    queue: SharedSampleQueue,
    buffer: RollingBuffer,
    ticker: RenderTicker,
    last_fault: Option<AudioError>,
}

impl ScopeController {
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        config: CaptureConfig,
        queue_capacity: usize,
    ) -> Result<Self> {
        config.validate()?;
        if queue_capacity == 0 {
            return Err(ConfigError::invalid("queue.capacity", 0, "must hold at least one block").into());
        }
        let display_len = config.display_len()?;

        info!(
            backend = backend.name(),
            display_len,
            sample_rate = config.sample_rate,
            downsample = config.downsample_factor,
            window_ms = config.window_length_ms,
            "Scope controller ready"
        );

        let session = CaptureSession::new(backend.clone());
        session.set_downsample(config.downsample_factor);

        Ok(Self {
            ticker: RenderTicker::new(config.refresh_interval()),
            buffer: RollingBuffer::new(display_len),
            queue: create_shared_queue(queue_capacity),
            binding: DeviceBinding::new(backend),
            session,
            config,
            last_fault: None,
        })
    }

    pub fn from_app_config(backend: Arc<dyn CaptureBackend>, app: &AppConfig) -> Result<Self> {
        Self::new(backend, app.capture.clone(), app.queue.capacity)
    }

    /// Start capture on the configured device (or the default one)
    ///
    /// A no-op while already running. Recovers a Failed session.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_running() {
            return Ok(());
        }

        let handle = self.binding.resolve_selection(self.config.device_id.as_deref())?;
        self.binding.bind(handle.clone(), self.session.state())?;
        self.last_fault = None;

        let queue = self.queue.clone();
        self.session.start(&self.config, &handle, move |block| {
            queue.enqueue(block);
        })?;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.session.stop();
    }

    pub fn set_window_length(&mut self, window_length_ms: u32) -> Result<()> {
        let candidate = CaptureConfig {
            window_length_ms,
            ..self.config.clone()
        };
        let len = candidate.display_len()?;
        self.commit(candidate, len);
        Ok(())
    }

    /// Takes effect on the running callback without reopening the stream
    pub fn set_downsample(&mut self, downsample_factor: u32) -> Result<()> {
        let candidate = CaptureConfig {
            downsample_factor,
            ..self.config.clone()
        };
        let len = candidate.display_len()?;
        self.commit(candidate, len);
        Ok(())
    }

    /// Restarts a running session at the new rate before returning
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        let candidate = CaptureConfig {
            sample_rate,
            ..self.config.clone()
        };
        let len = candidate.display_len()?;

        if !self.session.is_running() {
            self.commit(candidate, len);
            return Ok(());
        }

        let previous = self.config.clone();
        self.session.stop();
        self.commit(candidate, len);
        if let Err(e) = self.start() {
            self.rollback(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Rebinds to `device_id`, restarting a running session on it
    pub fn set_device(&mut self, device_id: &str) -> Result<()> {
        let device_id = device_id.trim();
        let handle = self.binding.resolve(device_id)?;
        let candidate = CaptureConfig {
            device_id: Some(handle.id.clone()),
            ..self.config.clone()
        };
        let len = candidate.display_len()?;

        if !self.session.is_running() {
            self.binding.bind(handle, self.session.state())?;
            self.commit(candidate, len);
            return Ok(());
        }

        let previous = self.config.clone();
        self.session.stop();
        self.commit(candidate, len);
        if let Err(e) = self.start() {
            self.rollback(previous);
            return Err(e);
        }
        Ok(())
    }

    /// Does not reset the display; queued blocks are kept
    pub fn set_refresh_interval(&mut self, refresh_interval_ms: u32) -> Result<()> {
        if refresh_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "refresh_interval_ms",
                refresh_interval_ms,
                "must be a positive number of milliseconds",
            )
            .into());
        }
        self.config.refresh_interval_ms = refresh_interval_ms;
        self.ticker.set_interval(self.config.refresh_interval());
        info!(refresh_interval_ms, "Refresh interval changed");
        Ok(())
    }

    /// Apply a UI text value to `parameter`
    pub fn apply(&mut self, parameter: Parameter, raw: &str) -> Result<()> {
        let name = parameter.config_name();
        match parameter {
            Parameter::Device => {
                let id = raw.trim();
                if id.is_empty() {
                    return Err(ConfigError::invalid(name, id, "must not be empty").into());
                }
                self.set_device(id)
            }
            Parameter::WindowLength => self.set_window_length(parse_positive(name, raw)?),
            Parameter::SampleRate => self.set_sample_rate(parse_positive(name, raw)?),
            Parameter::Downsample => self.set_downsample(parse_positive(name, raw)?),
            Parameter::RefreshInterval => self.set_refresh_interval(parse_positive(name, raw)?),
        }
    }

    /// Commit a validated config: reset the display and retire queued blocks
    fn commit(&mut self, config: CaptureConfig, display_len: usize) {
        self.config = config;
        self.buffer.resize(display_len);
        let generation = self.session.set_downsample(self.config.downsample_factor);
        info!(
            display_len,
            sample_rate = self.config.sample_rate,
            downsample = self.config.downsample_factor,
            window_ms = self.config.window_length_ms,
            device = self.config.device_id.as_deref().unwrap_or("default"),
            generation,
            "Capture configuration applied"
        );
    }

    fn rollback(&mut self, previous: CaptureConfig) {
        warn!("Restart failed; restoring previous capture configuration");
        if let Ok(len) = previous.display_len() {
            self.commit(previous, len);
        }
        if let Ok(handle) = self
            .binding
            .resolve_selection(self.config.device_id.as_deref())
        {
            let _ = self.binding.bind(handle, self.session.state());
        }
    }

    /// One render cycle: surface session faults, drain the queue, signal `sink`
    pub fn tick(&mut self, sink: &mut dyn FrameSink) -> TickReport {
        while let Some(fault) = self.session.take_fault() {
            if fault.is_fatal() {
                error!(state = %self.session.state(), "Capture session failed: {}", fault);
                self.last_fault = Some(fault);
            } else {
                warn!(errors = self.session.stream_errors(), "{}", fault);
            }
        }
        let generation = self.session.generation();
        self.ticker
            .tick(&self.queue, &mut self.buffer, generation, sink)
    }

    /// Active capture configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Capture counters and lifecycle
    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Current lifecycle state of the capture session
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Check if capture is running
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Most recent fault that stopped capture, cleared on `start`
    pub fn last_fault(&self) -> Option<&AudioError> {
        self.last_fault.as_ref()
    }

    /// Enumerate input devices on the backend
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.binding.list_devices()
    }

    pub fn bound_device(&self) -> Option<&DeviceHandle> {
        self.binding.bound()
    }

    /// Rolling window contents, oldest first
    pub fn snapshot(&self) -> Vec<f32> {
        self.buffer.snapshot()
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }

    /// Window length in samples
    pub fn display_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn refresh_interval(&self) -> Duration {
        self.ticker.interval()
    }

    pub fn generation(&self) -> u32 {
        self.session.generation()
    }

    /// Get sample queue statistics
    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Frames handed to the renderer so far
    pub fn frames_rendered(&self) -> u64 {
        self.ticker.frames_rendered()
    }
}
