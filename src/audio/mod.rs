//! Audio acquisition: backends, device binding, capture sessions and the
//! sample queue between the callback and the render tick

pub mod backend;
pub mod device;
pub mod queue;
pub mod session;
pub mod synthetic;

pub use backend::{CaptureBackend, CpalBackend};
pub use device::{DeviceBinding, DeviceDescriptor, DeviceHandle};
pub use queue::{SampleBlock, SampleQueue, SharedSampleQueue};
pub use session::{CaptureSession, SessionState};
pub use synthetic::{SyntheticBackend, Waveform};
