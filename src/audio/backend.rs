//! Capture backends
//!
//! The session never talks to the OS audio stack directly; it goes through
//! a [`CaptureBackend`], which enumerates devices and opens input streams.
//! [`CpalBackend`] drives real hardware, `SyntheticBackend` generates a
//! signal in-process.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use tracing::info;

use crate::audio::device::{input_device_by_id, list_input_devices, DeviceDescriptor, DeviceHandle};
use crate::error::AudioError;

/// Receives interleaved f32 frames and the channel count of the stream
pub type FrameCallback = Box<dyn FnMut(&[f32], u16) + Send + 'static>;

/// Receives asynchronous stream errors
///
/// `DeviceUnavailable` means the stream is gone; `StreamError` reports a
/// recoverable glitch after which frames keep arriving.
pub type StreamErrorCallback = Box<dyn FnMut(AudioError) + Send + 'static>;

/// An open input stream; capture stops when it is dropped
///
/// Dropping must not return while a frame callback is still executing.
pub trait InputStream {
    fn channels(&self) -> u16;
}

/// Source of devices and input streams
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &str;

    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Open and start a stream on `device` at `sample_rate`
    ///
    /// Called from the session's capture thread; the returned stream stays
    /// on that thread until it is dropped.
    fn open_input(
        &self,
        device: &DeviceHandle,
        sample_rate: u32,
        on_frames: FrameCallback,
        on_error: StreamErrorCallback,
    ) -> Result<Box<dyn InputStream>, AudioError>;
}

/// Hardware capture through the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

struct CpalStream {
    _stream: cpal::Stream,
    channels: u16,
}

impl InputStream for CpalStream {
    fn channels(&self) -> u16 {
        self.channels
    }
}

impl CaptureBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        list_input_devices()
    }

    fn open_input(
        &self,
        handle: &DeviceHandle,
        sample_rate: u32,
        on_frames: FrameCallback,
        on_error: StreamErrorCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        // A device that vanished since it was listed is unavailable, not unknown
        let device = input_device_by_id(&handle.id).map_err(|e| match e {
            AudioError::DeviceNotFound(id) => {
                AudioError::DeviceUnavailable(format!("{} is no longer present", id))
            }
            other => other,
        })?;

        let default_config = device
            .default_input_config()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
        let channels = default_config.channels();
        let sample_format = default_config.sample_format();

        let rate = cpal::SampleRate(sample_rate);
        let rate_supported = device
            .supported_input_configs()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?
            .any(|range| {
                range.channels() == channels
                    && range.sample_format() == sample_format
                    && rate >= range.min_sample_rate()
                    && rate <= range.max_sample_rate()
            });
        if !rate_supported {
            return Err(AudioError::DeviceUnavailable(format!(
                "{} does not support {} Hz",
                handle.name, sample_rate
            )));
        }

        let config = StreamConfig {
            channels,
            sample_rate: rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_f32_stream(&device, &config, on_frames, on_error)?,
            SampleFormat::I16 => build_converted_stream::<i16>(&device, &config, on_frames, on_error)?,
            SampleFormat::U16 => build_converted_stream::<u16>(&device, &config, on_frames, on_error)?,
            SampleFormat::I32 => build_converted_stream::<i32>(&device, &config, on_frames, on_error)?,
            other => {
                return Err(AudioError::UnsupportedFormat(format!("{:?}", other)));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        info!(
            device = %handle.id,
            sample_rate,
            channels,
            format = ?sample_format,
            "Opened input stream"
        );

        Ok(Box::new(CpalStream {
            _stream: stream,
            channels,
        }))
    }
}

/// Only a vanished device is fatal; cpal keeps the stream running after
/// backend-specific errors (xruns, poll failures)
fn stream_error(err: cpal::StreamError) -> AudioError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            AudioError::DeviceUnavailable("device is no longer available".to_string())
        }
        cpal::StreamError::BackendSpecific { err } => AudioError::StreamError(err.to_string()),
    }
}

fn build_f32_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut on_frames: FrameCallback,
    mut on_error: StreamErrorCallback,
) -> Result<cpal::Stream, AudioError> {
    let channels = config.channels;
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| on_frames(data, channels),
            move |err| on_error(stream_error(err)),
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}

fn build_converted_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut on_frames: FrameCallback,
    mut on_error: StreamErrorCallback,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels;
    // Grows to the largest batch once, then is reused
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|&s| f32::from_sample(s)));
                on_frames(&scratch, channels);
            },
            move |err| on_error(stream_error(err)),
            None,
        )
        .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))
}
