//! Display side of the pipeline: the rolling buffer and the render tick

pub mod rolling;
pub mod ticker;

pub use rolling::RollingBuffer;
pub use ticker::{FrameSink, RenderTicker, TickReport};
