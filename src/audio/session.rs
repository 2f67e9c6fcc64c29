//! Capture session lifecycle
//!
//! A session owns one input stream. The stream lives on a dedicated capture
//! thread (cpal streams are not `Send` on every platform); the session talks
//! to that thread over channels and joins it on stop, so once `stop`
//! returns no callback is still running.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audio::backend::CaptureBackend;
use crate::audio::device::DeviceHandle;
use crate::audio::queue::SampleBlock;
use crate::config::CaptureConfig;
use crate::error::AudioError;

/// How long `start` waits for the backend to open the stream
pub const STREAM_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pending faults per session; one slot is kept free for a fatal fault
const FAULT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Failed = 4,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Failed,
            _ => Self::Idle,
        }
    }

    /// Starting or Running
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

struct AtomicSessionState(AtomicU8);

impl AtomicSessionState {
    fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// Downsample stride and generation, packed so the callback reads both at once
///
/// High 32 bits: generation. Low 32 bits: stride.
pub struct StreamParams(AtomicU64);

impl StreamParams {
    /// Pack an initial stride and generation
    pub fn new(stride: u32, generation: u32) -> Self {
        Self(AtomicU64::new(Self::pack(stride, generation)))
    }

    fn pack(stride: u32, generation: u32) -> u64 {
        ((generation as u64) << 32) | stride.max(1) as u64
    }

    /// Returns `(stride, generation)`
    pub fn load(&self) -> (u32, u32) {
        let packed = self.0.load(Ordering::Acquire);
        (packed as u32, (packed >> 32) as u32)
    }

    /// Current generation
    pub fn generation(&self) -> u32 {
        self.load().1
    }

    /// Set a new stride and advance the generation; returns the new generation
    pub fn reconfigure(&self, stride: u32) -> u32 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let generation = ((current >> 32) as u32).wrapping_add(1);
            match self.0.compare_exchange_weak(
                current,
                Self::pack(stride, generation),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return generation,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Select channel 0 of every `stride`-th interleaved frame
pub fn downsample_first_channel(data: &[f32], channels: u16, stride: u32) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    let stride = stride.max(1) as usize;
    data.chunks_exact(channels)
        .step_by(stride)
        .map(|frame| frame[0])
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// One bound capture stream and its lifecycle
pub struct CaptureSession {
    backend: Arc<dyn CaptureBackend>,
    state: Arc<AtomicSessionState>,
    params: Arc<StreamParams>,
    /// Cleared before teardown and on fault; the callback drops frames while false
    active: Arc<AtomicBool>,
    shutdown_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
    fault_rx: Option<Receiver<AudioError>>,
    blocks_delivered: Arc<AtomicU64>,
    frames_captured: Arc<AtomicU64>,
    stream_errors: Arc<AtomicU64>,
}

impl CaptureSession {
    /// Idle session on `backend`
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(AtomicSessionState::new(SessionState::Idle)),
            params: Arc::new(StreamParams::new(1, 0)),
            active: Arc::new(AtomicBool::new(false)),
            shutdown_tx: None,
            thread_handle: None,
            fault_rx: None,
            blocks_delivered: Arc::new(AtomicU64::new(0)),
            frames_captured: Arc::new(AtomicU64::new(0)),
            stream_errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a stream on `device` and deliver downsampled blocks to `on_block`
    ///
    /// `on_block` runs on the audio callback thread and must not block.
    pub fn start<F>(
        &mut self,
        config: &CaptureConfig,
        device: &DeviceHandle,
        on_block: F,
    ) -> Result<(), AudioError>
    where
        F: FnMut(SampleBlock) + Send + 'static,
    {
        self.start_with_timeout(config, device, on_block, STREAM_OPEN_TIMEOUT)
    }

    /// `start` with a custom wait for the backend to open the stream
    ///
    /// On timeout the session is Failed; the capture thread is joined by the
    /// next `start` or `stop` once the backend returns.
    pub fn start_with_timeout<F>(
        &mut self,
        config: &CaptureConfig,
        device: &DeviceHandle,
        on_block: F,
        open_timeout: Duration,
    ) -> Result<(), AudioError>
    where
        F: FnMut(SampleBlock) + Send + 'static,
    {
        if self.state.get().is_active() {
            return Err(AudioError::SessionActive);
        }
        // Leftovers from a failed or timed-out start
        self.teardown();

        self.state.set(SessionState::Starting);
        let generation = self.params.reconfigure(config.downsample_factor);
        self.blocks_delivered.store(0, Ordering::SeqCst);
        self.frames_captured.store(0, Ordering::SeqCst);
        self.stream_errors.store(0, Ordering::SeqCst);
        self.active.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = bounded::<Result<u16, AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (fault_tx, fault_rx) = bounded::<AudioError>(FAULT_CHANNEL_CAPACITY);
        self.fault_rx = Some(fault_rx);
        self.shutdown_tx = Some(shutdown_tx);

        let on_frames = {
            let active = self.active.clone();
            let state = self.state.clone();
            let params = self.params.clone();
            let blocks_delivered = self.blocks_delivered.clone();
            let frames_captured = self.frames_captured.clone();
            let fault_tx = fault_tx.clone();
            let mut on_block = on_block;
            let mut sequence: u64 = 0;

            move |data: &[f32], channels: u16| {
                if !active.load(Ordering::Acquire) {
                    return;
                }

                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    let (stride, generation) = params.load();
                    let samples = downsample_first_channel(data, channels, stride);
                    frames_captured.fetch_add(
                        (data.len() / channels.max(1) as usize) as u64,
                        Ordering::Relaxed,
                    );
                    on_block(SampleBlock::new(samples, generation, sequence));
                    sequence += 1;
                    blocks_delivered.fetch_add(1, Ordering::Relaxed);
                }));

                if let Err(payload) = outcome {
                    active.store(false, Ordering::Release);
                    state.set(SessionState::Failed);
                    let _ = fault_tx.try_send(AudioError::CallbackFault(panic_message(&*payload)));
                }
            }
        };

        let on_error = {
            let active = self.active.clone();
            let state = self.state.clone();
            let stream_errors = self.stream_errors.clone();
            move |err: AudioError| {
                if !err.is_fatal() {
                    stream_errors.fetch_add(1, Ordering::Relaxed);
                    if fault_tx.len() + 1 < FAULT_CHANNEL_CAPACITY {
                        let _ = fault_tx.try_send(err);
                    }
                    return;
                }
                active.store(false, Ordering::Release);
                state.set(SessionState::Failed);
                let _ = fault_tx.try_send(err);
            }
        };

        let backend = self.backend.clone();
        let thread_device = device.clone();
        let sample_rate = config.sample_rate;

        let spawned = thread::Builder::new()
            .name("scope-capture".to_string())
            .spawn(move || {
                match backend.open_input(
                    &thread_device,
                    sample_rate,
                    Box::new(on_frames),
                    Box::new(on_error),
                ) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(stream.channels()));
                        // Parked until stop sends or drops the sender
                        let _ = shutdown_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.fail_start();
                return Err(AudioError::DeviceUnavailable(e.to_string()));
            }
        };
        self.thread_handle = Some(handle);

        match ready_rx.recv_timeout(open_timeout) {
            Ok(Ok(channels)) => {
                if self.state.transition(SessionState::Starting, SessionState::Running) {
                    info!(
                        backend = self.backend.name(),
                        device = %device.id,
                        sample_rate,
                        channels,
                        downsample = config.downsample_factor,
                        generation,
                        "Capture session running"
                    );
                    Ok(())
                } else {
                    // Stream reported a fatal error before we observed readiness
                    let fault = self
                        .take_fatal_fault()
                        .unwrap_or_else(|| AudioError::DeviceUnavailable(device.id.clone()));
                    warn!(device = %device.id, "Capture session failed during start: {}", fault);
                    Err(fault)
                }
            }
            Ok(Err(e)) => {
                self.fail_start();
                warn!(device = %device.id, "Failed to open input stream: {}", e);
                Err(e)
            }
            Err(_) => {
                self.fail_start();
                warn!(device = %device.id, "Timed out opening input stream");
                Err(AudioError::DeviceUnavailable(format!(
                    "timed out opening {}",
                    device.id
                )))
            }
        }
    }

    fn fail_start(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        self.shutdown_tx = None;
        self.state.set(SessionState::Failed);
    }

    /// Stop capture and release the stream
    ///
    /// Blocks until the capture thread has exited.
    pub fn stop(&mut self) {
        let prior = self.state.get();
        if prior == SessionState::Idle && self.thread_handle.is_none() {
            return;
        }

        self.state.set(SessionState::Stopping);
        self.teardown();
        self.state.set(SessionState::Idle);
        info!(previous = %prior, "Capture session stopped");
    }

    fn teardown(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                debug!("Capture thread panicked during teardown");
            }
        }
    }

    fn take_fatal_fault(&self) -> Option<AudioError> {
        std::iter::from_fn(|| self.take_fault()).find(AudioError::is_fatal)
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Check if the stream is delivering blocks
    pub fn is_running(&self) -> bool {
        self.state.get() == SessionState::Running
    }

    /// Pending fault raised by the callback or the stream, if any
    pub fn take_fault(&self) -> Option<AudioError> {
        self.fault_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }

    /// Generation stamped on blocks captured from now on
    pub fn generation(&self) -> u32 {
        self.params.generation()
    }

    /// Change the stride used by a running callback; returns the new generation
    pub fn set_downsample(&self, factor: u32) -> u32 {
        self.params.reconfigure(factor)
    }

    /// Blocks handed to `on_block` since the last start
    pub fn blocks_delivered(&self) -> u64 {
        self.blocks_delivered.load(Ordering::Relaxed)
    }

    /// Input frames seen by the callback since the last start
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Recoverable stream errors since the last start
    pub fn stream_errors(&self) -> u64 {
        self.stream_errors.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}
