//! In-process signal generator implementing [`CaptureBackend`]
//!
//! Each opened stream runs a generator thread that delivers interleaved
//! blocks at a fixed period, the way a driver thread would. Devices can be
//! marked unavailable to simulate a busy or unplugged input.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

use crate::audio::backend::{CaptureBackend, FrameCallback, InputStream, StreamErrorCallback};
use crate::audio::device::{DeviceDescriptor, DeviceHandle};
use crate::error::AudioError;

/// Highest sample rate the generator accepts
pub const MAX_SYNTHETIC_SAMPLE_RATE: u32 = 384_000;

/// Default frames per delivered block
pub const DEFAULT_BLOCK_FRAMES: usize = 512;

/// Signal shape produced on channel 0; other channels carry its negation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    Sine { frequency_hz: f32, amplitude: f32 },
    /// Frame index as the sample value
    Ramp,
    Silence,
}

impl Waveform {
    fn sample(&self, frame_index: u64, sample_rate: u32) -> f32 {
        match *self {
            Waveform::Sine {
                frequency_hz,
                amplitude,
            } => {
                let t = frame_index as f64 / sample_rate as f64;
                amplitude * (2.0 * std::f64::consts::PI * frequency_hz as f64 * t).sin() as f32
            }
            Waveform::Ramp => frame_index as f32,
            Waveform::Silence => 0.0,
        }
    }
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sine {
            frequency_hz: 440.0,
            amplitude: 0.25,
        }
    }
}

#[derive(Default)]
struct SyntheticState {
    unavailable: HashSet<String>,
    opened: usize,
    live_streams: usize,
}

/// Generator backend for demos and tests
pub struct SyntheticBackend {
    devices: Vec<DeviceDescriptor>,
    waveform: Waveform,
    channels: u16,
    block_frames: usize,
    period: Option<Duration>,
    glitch_every: Option<u64>,
    open_delay: Option<Duration>,
    fault_during_open: bool,
    state: Arc<Mutex<SyntheticState>>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        let device = |id: &str, name: &str, is_default: bool| DeviceDescriptor {
            id: id.to_string(),
            display_name: name.to_string(),
            is_default,
            sample_rates: vec![22050, 44100, 48000, 96000],
            channels: vec![1, 2],
        };

        Self {
            devices: vec![
                device("synthetic:primary", "Synthetic Primary", true),
                device("synthetic:secondary", "Synthetic Secondary", false),
            ],
            waveform: Waveform::default(),
            channels: 2,
            block_frames: DEFAULT_BLOCK_FRAMES,
            period: None,
            glitch_every: None,
            open_delay: None,
            fault_during_open: false,
            state: Arc::new(Mutex::new(SyntheticState::default())),
        }
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1);
        self
    }

    pub fn with_block_frames(mut self, frames: usize) -> Self {
        self.block_frames = frames.max(1);
        self
    }

    /// Deliver blocks at a fixed period instead of real time
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Report a recoverable stream error after every `blocks` blocks
    pub fn with_glitch_every(mut self, blocks: u64) -> Self {
        self.glitch_every = Some(blocks.max(1));
        self
    }

    /// Block inside `open_input` for `delay`, like a slow driver
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Raise a device-lost error before `open_input` returns the stream
    pub fn with_fault_during_open(mut self) -> Self {
        self.fault_during_open = true;
        self
    }

    /// Mark a device busy or unplugged; running streams on it fail
    pub fn set_unavailable(&self, device_id: &str, unavailable: bool) {
        let mut state = self.state.lock();
        if unavailable {
            state.unavailable.insert(device_id.to_string());
        } else {
            state.unavailable.remove(device_id);
        }
    }

    /// Streams opened since creation
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Streams currently alive
    pub fn live_streams(&self) -> usize {
        self.state.lock().live_streams
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct SyntheticStream {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    channels: u16,
    state: Arc<Mutex<SyntheticState>>,
}

impl InputStream for SyntheticStream {
    fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
        self.state.lock().live_streams -= 1;
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.clone()
    }

    fn open_input(
        &self,
        device: &DeviceHandle,
        sample_rate: u32,
        mut on_frames: FrameCallback,
        mut on_error: StreamErrorCallback,
    ) -> Result<Box<dyn InputStream>, AudioError> {
        if let Some(delay) = self.open_delay {
            thread::sleep(delay);
        }
        if !self.devices.iter().any(|d| d.id == device.id) {
            return Err(AudioError::DeviceUnavailable(format!(
                "{} is no longer present",
                device.id
            )));
        }
        if self.state.lock().unavailable.contains(&device.id) {
            return Err(AudioError::DeviceUnavailable(format!("{} is busy", device.id)));
        }
        if sample_rate == 0 || sample_rate > MAX_SYNTHETIC_SAMPLE_RATE {
            return Err(AudioError::DeviceUnavailable(format!(
                "{} Hz is not supported",
                sample_rate
            )));
        }

        if self.fault_during_open {
            on_error(AudioError::DeviceUnavailable(format!(
                "{} disconnected while opening",
                device.id
            )));
        }

        let channels = self.channels;
        let glitch_every = self.glitch_every;
        let block_frames = self.block_frames;
        let waveform = self.waveform;
        let period = self.period.unwrap_or_else(|| {
            Duration::from_secs_f64(block_frames as f64 / sample_rate as f64)
        });

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_loop = stop.clone();
        let state = self.state.clone();
        let device_id = device.id.clone();

        let thread = thread::Builder::new()
            .name(format!("synthetic-{}", device.id))
            .spawn(move || {
                let ch = channels as usize;
                let mut frame_index: u64 = 0;
                let mut blocks: u64 = 0;
                let mut block = vec![0.0f32; block_frames * ch];

                while !stop_for_loop.load(Ordering::Acquire) {
                    if state.lock().unavailable.contains(&device_id) {
                        debug!(device = %device_id, "Synthetic device disconnected");
                        on_error(AudioError::DeviceUnavailable(format!(
                            "{} disconnected",
                            device_id
                        )));
                        break;
                    }

                    for frame in block.chunks_exact_mut(ch) {
                        let value = waveform.sample(frame_index, sample_rate);
                        frame[0] = value;
                        for slot in &mut frame[1..] {
                            *slot = -value;
                        }
                        frame_index += 1;
                    }

                    on_frames(&block, channels);
                    blocks += 1;
                    if glitch_every.is_some_and(|every| blocks % every == 0) {
                        on_error(AudioError::StreamError(format!("{} overrun", device_id)));
                    }
                    thread::sleep(period);
                }
            })
            .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;

        {
            let mut state = self.state.lock();
            state.opened += 1;
            state.live_streams += 1;
        }

        Ok(Box::new(SyntheticStream {
            stop,
            thread: Some(thread),
            channels,
            state: self.state.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn handle(id: &str) -> DeviceHandle {
        DeviceHandle {
            id: id.to_string(),
            name: id.to_string(),
        }
    }

    #[test]
    fn test_ramp_interleaves_negated_channels() {
        let backend = SyntheticBackend::new()
            .with_waveform(Waveform::Ramp)
            .with_block_frames(4)
            .with_period(Duration::from_millis(1));

        let (tx, rx) = crossbeam_channel::bounded::<Vec<f32>>(64);
        let stream = backend
            .open_input(
                &handle("synthetic:primary"),
                48000,
                Box::new(move |data, _| {
                    let _ = tx.try_send(data.to_vec());
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
        assert_eq!(stream.channels(), 2);
        assert_eq!(backend.live_streams(), 1);

        drop(stream);
        assert_eq!(backend.live_streams(), 0);
        assert_eq!(backend.opened_count(), 1);
    }

    #[test]
    fn test_no_frames_after_drop() {
        let backend = SyntheticBackend::new().with_period(Duration::from_millis(1));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let stream = backend
            .open_input(
                &handle("synthetic:primary"),
                44100,
                Box::new(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                Box::new(|_| {}),
            )
            .unwrap();

        thread::sleep(Duration::from_millis(20));
        drop(stream);
        let after_drop = calls.load(Ordering::SeqCst);
        assert!(after_drop > 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn test_open_failures() {
        let backend = SyntheticBackend::new();
        let open = |id: &str, rate: u32| {
            backend
                .open_input(&handle(id), rate, Box::new(|_, _| {}), Box::new(|_| {}))
                .map(|_| ())
        };

        assert!(matches!(open("synthetic:missing", 44100), Err(AudioError::DeviceUnavailable(_))));
        assert!(matches!(open("synthetic:primary", 1_000_000), Err(AudioError::DeviceUnavailable(_))));

        backend.set_unavailable("synthetic:primary", true);
        assert!(matches!(open("synthetic:primary", 44100), Err(AudioError::DeviceUnavailable(_))));

        backend.set_unavailable("synthetic:primary", false);
        assert!(open("synthetic:primary", 44100).is_ok());
    }

    #[test]
    fn test_glitches_do_not_stop_frames() {
        let backend = SyntheticBackend::new()
            .with_block_frames(4)
            .with_period(Duration::from_millis(1))
            .with_glitch_every(2);
        let frames = Arc::new(AtomicUsize::new(0));
        let frame_counter = frames.clone();
        let (err_tx, err_rx) = crossbeam_channel::unbounded::<AudioError>();

        let stream = backend
            .open_input(
                &handle("synthetic:primary"),
                44100,
                Box::new(move |_, _| {
                    frame_counter.fetch_add(1, Ordering::SeqCst);
                }),
                Box::new(move |err| {
                    let _ = err_tx.send(err);
                }),
            )
            .unwrap();

        let first = err_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(first, AudioError::StreamError(_)));
        let seen = frames.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert!(frames.load(Ordering::SeqCst) > seen);
        drop(stream);
    }
}
