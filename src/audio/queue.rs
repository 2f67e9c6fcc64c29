//! Bounded sample queue between the capture callback and the render tick
//!
//! Single-producer single-consumer hand-off backed by a lock-free
//! `ArrayQueue`. The producer never blocks: when the queue is full the
//! newest block is dropped and counted.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One callback's worth of downsampled mono samples
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Downsampled samples, oldest first
    pub samples: Vec<f32>,
    /// Configuration epoch the block was captured under
    pub generation: u32,
    /// Block sequence number within its session
    pub sequence: u64,
}

impl SampleBlock {
    /// Create a block from downsampled samples
    pub fn new(samples: Vec<f32>, generation: u32, sequence: u64) -> Self {
        Self {
            samples,
            generation,
            sequence,
        }
    }

    /// Number of samples in the block
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Fixed-capacity FIFO of sample blocks
pub struct SampleQueue {
    queue: ArrayQueue<SampleBlock>,
    overflow_count: AtomicUsize,
    enqueued: AtomicUsize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` blocks
    ///
    /// Panics if `capacity` is zero, as `ArrayQueue` does.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            overflow_count: AtomicUsize::new(0),
            enqueued: AtomicUsize::new(0),
        }
    }

    /// Push a block from the capture callback
    /// Returns false if the queue is full; the block is discarded
    pub fn enqueue(&self, block: SampleBlock) -> bool {
        match self.queue.push(block) {
            Ok(()) => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Drain every block present at the time of the call, in enqueue order
    ///
    /// Blocks pushed while draining are left for the next call.
    pub fn dequeue_all(&self) -> Vec<SampleBlock> {
        let pending = self.queue.len();
        let mut blocks = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.queue.pop() {
                Some(block) => blocks.push(block),
                None => break,
            }
        }
        blocks
    }

    /// Check if no blocks are waiting
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Blocks currently waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Get queue capacity in blocks
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Blocks dropped because the queue was full
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Blocks accepted since creation
    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters for status displays
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            len: self.len(),
            capacity: self.capacity(),
            enqueued: self.enqueued_count(),
            dropped: self.overflow_count(),
        }
    }
}

/// Queue statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub len: usize,
    pub capacity: usize,
    pub enqueued: usize,
    pub dropped: usize,
}

impl QueueStats {
    /// Fraction of offered blocks that were dropped
    pub fn drop_rate(&self) -> f32 {
        let total = self.enqueued + self.dropped;
        if total == 0 {
            0.0
        } else {
            self.dropped as f32 / total as f32
        }
    }
}

/// Thread-safe handle to a sample queue
pub type SharedSampleQueue = Arc<SampleQueue>;

/// Create a queue shared between the callback and the ticker
pub fn create_shared_queue(capacity: usize) -> SharedSampleQueue {
    Arc::new(SampleQueue::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(seq: u64) -> SampleBlock {
        SampleBlock::new(vec![seq as f32; 4], 0, seq)
    }

    #[test]
    fn test_dequeue_all_preserves_order() {
        let queue = SampleQueue::new(8);
        for seq in 0..5 {
            assert!(queue.enqueue(block(seq)));
        }

        let drained = queue.dequeue_all();
        let sequences: Vec<u64> = drained.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

        assert!(queue.dequeue_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let queue = SampleQueue::new(20);
        for seq in 0..20 {
            assert!(queue.enqueue(block(seq)));
        }
        assert_eq!(queue.len(), queue.capacity());

        assert!(!queue.enqueue(block(20)));
        assert_eq!(queue.len(), 20);
        assert_eq!(queue.overflow_count(), 1);

        let drained = queue.dequeue_all();
        assert_eq!(drained.len(), 20);
        assert_eq!(drained.last().map(|b| b.sequence), Some(19));
    }

    #[test]
    fn test_stats() {
        let queue = SampleQueue::new(2);
        queue.enqueue(block(0));
        queue.enqueue(block(1));
        queue.enqueue(block(2));

        let stats = queue.stats();
        assert_eq!(stats.len, 2);
        assert_eq!(stats.enqueued, 2);
        assert_eq!(stats.dropped, 1);
        assert!((stats.drop_rate() - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_concurrent_producer_keeps_order() {
        let queue = create_shared_queue(16);
        let producer_queue = queue.clone();

        let producer = std::thread::spawn(move || {
            let mut accepted = Vec::new();
            for seq in 0..2_000u64 {
                if producer_queue.enqueue(block(seq)) {
                    accepted.push(seq);
                }
            }
            accepted
        });

        let mut received = Vec::new();
        while !producer.is_finished() || !queue.is_empty() {
            received.extend(queue.dequeue_all().into_iter().map(|b| b.sequence));
            std::thread::yield_now();
        }
        received.extend(queue.dequeue_all().into_iter().map(|b| b.sequence));

        let accepted = producer.join().unwrap();
        assert_eq!(received, accepted);
        assert_eq!(accepted.len() + queue.overflow_count(), 2_000);
    }
}
