//! Fixed-length rolling window of the most recent samples
//!
//! Stored as a ring: `head` is the index of the oldest sample. Absorbing a
//! block overwrites the oldest slots and moves the head past them, which is
//! the same as dropping the oldest `n` samples and appending `n` new ones.

/// Largest absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Root mean square level, 0.0 for an empty slice
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Rolling display buffer, single channel
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    data: Vec<f32>,
    head: usize,
}

impl RollingBuffer {
    /// Zero-filled buffer of `length` samples
    pub fn new(length: usize) -> Self {
        Self {
            data: vec![0.0; length],
            head: 0,
        }
    }

    /// Reallocate to `new_length` and zero-fill; prior history is discarded
    pub fn resize(&mut self, new_length: usize) {
        self.data = vec![0.0; new_length];
        self.head = 0;
    }

    /// Shift in a block of new samples, oldest first
    pub fn absorb(&mut self, block: &[f32]) {
        let len = self.data.len();
        let shift = block.len();
        if len == 0 || shift == 0 {
            return;
        }

        if shift >= len {
            self.data.copy_from_slice(&block[shift - len..]);
            self.head = 0;
            return;
        }

        // Write over the oldest `shift` slots, wrapping once at most
        let first = shift.min(len - self.head);
        self.data[self.head..self.head + first].copy_from_slice(&block[..first]);
        self.data[..shift - first].copy_from_slice(&block[first..]);
        self.head = (self.head + shift) % len;
    }

    /// Contents in temporal order, oldest first
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.data.len());
        self.snapshot_into(&mut out);
        out
    }

    /// Like `snapshot` but reuses `out`'s allocation
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.extend_from_slice(&self.data[self.head..]);
        out.extend_from_slice(&self.data[..self.head]);
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<f32> {
        if self.data.is_empty() {
            return None;
        }
        let newest = (self.head + self.data.len() - 1) % self.data.len();
        Some(self.data[newest])
    }

    /// Window length in samples
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_shifts_left() {
        let mut buffer = RollingBuffer::new(5);
        buffer.absorb(&[1.0, 2.0]);
        assert_eq!(buffer.snapshot(), vec![0.0, 0.0, 0.0, 1.0, 2.0]);

        buffer.absorb(&[3.0, 4.0, 5.0]);
        assert_eq!(buffer.snapshot(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);

        // Wraps around the end of storage
        buffer.absorb(&[6.0, 7.0, 8.0]);
        assert_eq!(buffer.snapshot(), vec![4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(buffer.latest(), Some(8.0));
    }

    #[test]
    fn test_oversized_block_keeps_tail() {
        let mut buffer = RollingBuffer::new(3);
        buffer.absorb(&[9.0]);
        buffer.absorb(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.snapshot(), vec![3.0, 4.0, 5.0]);

        buffer.absorb(&[6.0, 7.0, 8.0]);
        assert_eq!(buffer.snapshot(), vec![6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_resize_zero_fills() {
        let mut buffer = RollingBuffer::new(4);
        buffer.absorb(&[1.0, 2.0, 3.0]);

        buffer.resize(6);
        assert_eq!(buffer.len(), 6);
        assert_eq!(buffer.snapshot(), vec![0.0; 6]);

        buffer.absorb(&[1.0]);
        buffer.resize(6);
        assert_eq!(buffer.snapshot(), vec![0.0; 6]);
    }

    #[test]
    fn test_empty_block_is_noop() {
        let mut buffer = RollingBuffer::new(3);
        buffer.absorb(&[1.0, 2.0]);
        buffer.absorb(&[]);
        assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 2.0]);

        let mut empty = RollingBuffer::new(0);
        empty.absorb(&[1.0]);
        assert!(empty.snapshot().is_empty());
        assert_eq!(empty.latest(), None);
    }

    #[test]
    fn test_levels() {
        let mut buffer = RollingBuffer::new(4);
        buffer.absorb(&[0.5, -1.0, 0.5, 0.0]);
        let snapshot = buffer.snapshot();
        assert_eq!(peak(&snapshot), 1.0);
        assert!((rms(&snapshot) - (1.5f32 / 4.0).sqrt()).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }
}
