//! Render tick driver
//!
//! Each tick drains the sample queue into the rolling buffer and, when new
//! samples arrived, hands a snapshot to the renderer. Ticks with nothing to
//! absorb do not signal the renderer.

use std::time::Duration;
use tracing::{trace, warn};

use crate::audio::queue::SampleQueue;
use crate::display::rolling::RollingBuffer;
use crate::error::AudioError;

/// Receives a temporally ordered snapshot whenever a new frame is ready
pub trait FrameSink {
    fn frame_ready(&mut self, snapshot: &[f32]);
}

impl<F: FnMut(&[f32])> FrameSink for F {
    fn frame_ready(&mut self, snapshot: &[f32]) {
        self(snapshot)
    }
}

/// Outcome of a single tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub blocks_absorbed: usize,
    pub samples_absorbed: usize,
    /// Blocks from an older generation, discarded unseen
    pub stale_blocks: usize,
    pub frame_ready: bool,
}

/// Periodic queue-to-buffer driver
pub struct RenderTicker {
    interval: Duration,
    snapshot: Vec<f32>,
    frames_rendered: u64,
    overflow_seen: usize,
}

impl RenderTicker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            snapshot: Vec::new(),
            frames_rendered: 0,
            overflow_seen: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Picked up by the scheduler on its next cycle; queued blocks are kept
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Drain `queue`, absorb blocks of `generation` in arrival order, and
    /// signal `sink` if anything was absorbed
    pub fn tick(
        &mut self,
        queue: &SampleQueue,
        buffer: &mut RollingBuffer,
        generation: u32,
        sink: &mut dyn FrameSink,
    ) -> TickReport {
        let mut report = TickReport::default();

        for block in queue.dequeue_all() {
            if block.generation != generation {
                report.stale_blocks += 1;
                continue;
            }
            buffer.absorb(&block.samples);
            report.blocks_absorbed += 1;
            report.samples_absorbed += block.len();
        }

        let dropped = queue.overflow_count();
        if dropped > self.overflow_seen {
            warn!(
                capacity = queue.capacity(),
                "{}",
                AudioError::QueueOverflow(dropped - self.overflow_seen)
            );
        }
        self.overflow_seen = dropped;

        if report.blocks_absorbed > 0 {
            buffer.snapshot_into(&mut self.snapshot);
            sink.frame_ready(&self.snapshot);
            self.frames_rendered += 1;
            report.frame_ready = true;
        }

        trace!(
            absorbed = report.blocks_absorbed,
            stale = report.stale_blocks,
            samples = report.samples_absorbed,
            "Render tick"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::queue::SampleBlock;

    #[test]
    fn test_tick_absorbs_in_order_and_signals() {
        let queue = SampleQueue::new(8);
        let mut buffer = RollingBuffer::new(4);
        let mut ticker = RenderTicker::new(Duration::from_millis(30));

        queue.enqueue(SampleBlock::new(vec![1.0, 2.0], 3, 0));
        queue.enqueue(SampleBlock::new(vec![3.0], 3, 1));

        let mut frames: Vec<Vec<f32>> = Vec::new();
        let mut sink = |snapshot: &[f32]| frames.push(snapshot.to_vec());
        let report = ticker.tick(&queue, &mut buffer, 3, &mut sink);

        assert_eq!(
            report,
            TickReport {
                blocks_absorbed: 2,
                samples_absorbed: 3,
                stale_blocks: 0,
                frame_ready: true,
            }
        );
        assert_eq!(frames, vec![vec![0.0, 1.0, 2.0, 3.0]]);
        assert_eq!(ticker.frames_rendered(), 1);
    }

    #[test]
    fn test_empty_tick_skips_signal() {
        let queue = SampleQueue::new(4);
        let mut buffer = RollingBuffer::new(4);
        let mut ticker = RenderTicker::new(Duration::from_millis(30));

        let mut signalled = 0;
        let mut sink = |_: &[f32]| signalled += 1;
        let report = ticker.tick(&queue, &mut buffer, 0, &mut sink);

        assert!(!report.frame_ready);
        assert_eq!(signalled, 0);
        assert_eq!(ticker.frames_rendered(), 0);
    }

    #[test]
    fn test_stale_generation_is_discarded() {
        let queue = SampleQueue::new(8);
        let mut buffer = RollingBuffer::new(3);
        let mut ticker = RenderTicker::new(Duration::from_millis(30));

        queue.enqueue(SampleBlock::new(vec![7.0, 7.0], 1, 0));
        queue.enqueue(SampleBlock::new(vec![7.0], 1, 1));
        queue.enqueue(SampleBlock::new(vec![1.0], 2, 0));

        let report = ticker.tick(&queue, &mut buffer, 2, &mut |_: &[f32]| {});
        assert_eq!(report.stale_blocks, 2);
        assert_eq!(report.blocks_absorbed, 1);
        assert_eq!(buffer.snapshot(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_interval_change_keeps_queued_blocks() {
        let queue = SampleQueue::new(4);
        let mut buffer = RollingBuffer::new(2);
        let mut ticker = RenderTicker::new(Duration::from_millis(30));

        queue.enqueue(SampleBlock::new(vec![5.0], 0, 0));
        ticker.set_interval(Duration::from_millis(100));
        assert_eq!(ticker.interval(), Duration::from_millis(100));
        assert_eq!(queue.len(), 1);

        let report = ticker.tick(&queue, &mut buffer, 0, &mut |_: &[f32]| {});
        assert_eq!(report.blocks_absorbed, 1);
    }
}
