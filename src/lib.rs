//! # Live Scope
//!
//! Low-latency live capture of a mono audio signal into a fixed-length
//! rolling display buffer.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    AUDIO CALLBACK THREAD (context a)                  │
//! │  ┌─────────────┐    ┌──────────────────────┐    ┌──────────────────┐ │
//! │  │   Device    │───▶│   Capture Session    │───▶│  Sample Queue    │ │
//! │  │  (backend)  │    │ downsample + stamp   │    │ (ArrayQueue, N)  │ │
//! │  └─────────────┘    └──────────────────────┘    └────────┬─────────┘ │
//! └──────────────────────────────────────────────────────────┼───────────┘
//!                                                            │ dequeue_all
//! ┌──────────────────────────────────────────────────────────┼───────────┐
//! │                     CONTROL / RENDER THREAD (context b)  ▼           │
//! │  ┌──────────────────────┐   absorb   ┌──────────────────────────┐    │
//! │  │    Render Ticker     │───────────▶│     Rolling Buffer       │    │
//! │  └──────────┬───────────┘            └──────────────────────────┘    │
//! │             │ frame_ready(snapshot)                ▲ resize          │
//! │             ▼                                      │                 │
//! │  ┌──────────────────────┐            ┌─────────────┴────────────┐    │
//! │  │  Renderer (external) │            │  Reconfiguration         │    │
//! │  └──────────────────────┘            │  Controller (stop/start) │    │
//! │                                      └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The callback only ever touches the queue and a packed atomic holding the
//! downsample stride and the current generation. Every reconfiguration
//! advances the generation, and the ticker discards blocks stamped with an
//! older one.

pub mod audio;
pub mod config;
pub mod control;
pub mod display;
pub mod error;

pub use control::{Parameter, ScopeController};
pub use error::{Error, ErrorKind, Result};

/// Application-wide constants
pub mod constants {
    /// Default capture sample rate in Hz
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default downsample stride
    pub const DEFAULT_DOWNSAMPLE: u32 = 1;

    /// Default rolling window length in milliseconds
    pub const DEFAULT_WINDOW_LENGTH_MS: u32 = 1000;

    /// Default render tick interval in milliseconds
    pub const DEFAULT_REFRESH_INTERVAL_MS: u32 = 30;

    /// Default sample queue capacity (in blocks)
    pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

    /// Upper bound on the rolling buffer length
    pub const MAX_DISPLAY_SAMPLES: usize = 1 << 24;
}
