//! Input device enumeration and binding

use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::backend::CaptureBackend;
use crate::audio::session::SessionState;
use crate::error::AudioError;

/// Prefix used for hardware input device ids
pub const INPUT_ID_PREFIX: &str = "input:";

/// Description of an available input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: String,
    pub display_name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// A resolved device selection
///
/// Compared by id; the backend re-resolves it when a stream is opened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
}

impl From<&DeviceDescriptor> for DeviceHandle {
    fn from(descriptor: &DeviceDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.display_name.clone(),
        }
    }
}

/// Resolves device ids against a backend and holds the current selection
pub struct DeviceBinding {
    backend: Arc<dyn CaptureBackend>,
    bound: Option<DeviceHandle>,
}

impl DeviceBinding {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            bound: None,
        }
    }

    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.backend.list_devices()
    }

    /// Resolve an id against the current enumeration
    pub fn resolve(&self, device_id: &str) -> Result<DeviceHandle, AudioError> {
        self.backend
            .list_devices()
            .iter()
            .find(|d| d.id == device_id)
            .map(DeviceHandle::from)
            .ok_or_else(|| AudioError::DeviceNotFound(device_id.to_string()))
    }

    /// Resolve the backend's default input device
    pub fn resolve_default(&self) -> Result<DeviceHandle, AudioError> {
        let devices = self.backend.list_devices();
        devices
            .iter()
            .find(|d| d.is_default)
            .or_else(|| devices.first())
            .map(DeviceHandle::from)
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".to_string()))
    }

    /// Resolve `Some(id)` or fall back to the default device
    pub fn resolve_selection(&self, device_id: Option<&str>) -> Result<DeviceHandle, AudioError> {
        match device_id {
            Some(id) => self.resolve(id),
            None => self.resolve_default(),
        }
    }

    /// Bind a handle; refused while a session is starting or running
    pub fn bind(&mut self, handle: DeviceHandle, session_state: SessionState) -> Result<(), AudioError> {
        if session_state.is_active() {
            return Err(AudioError::SessionActive);
        }
        info!(device = %handle.id, "Bound input device");
        self.bound = Some(handle);
        Ok(())
    }

    /// Currently bound device, if any
    pub fn bound(&self) -> Option<&DeviceHandle> {
        self.bound.as_ref()
    }
}

/// List hardware input devices through the default cpal host
pub fn list_input_devices() -> Vec<DeviceDescriptor> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    match host.input_devices() {
        Ok(inputs) => {
            for device in inputs {
                let Ok(name) = device.name() else { continue };
                let (sample_rates, channels) = input_capabilities(&device);
                devices.push(DeviceDescriptor {
                    id: format!("{}{}", INPUT_ID_PREFIX, name),
                    is_default: default_name.as_ref() == Some(&name),
                    display_name: name,
                    sample_rates,
                    channels,
                });
            }
        }
        Err(e) => debug!("Input enumeration failed: {}", e),
    }

    devices
}

/// Common sample rates and channel counts an input device supports
fn input_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate_val in [8000u32, 16000, 22050, 44100, 48000, 88200, 96000, 192000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }

            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Find a hardware input device by id
///
/// Bare names without the `input:` prefix are accepted too.
pub fn input_device_by_id(id: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    let name = id.strip_prefix(INPUT_ID_PREFIX).unwrap_or(id);

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.to_string()))
}
