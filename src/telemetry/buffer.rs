// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sliding window over incoming samples

use std::collections::VecDeque;
use parking_lot::RwLock;

use super::Sample;

/// Default window length, matching the waveform monitor
pub const DEFAULT_CAPACITY: usize = 100;

/// Fixed-capacity FIFO of the most recent samples.
///
/// Single writer (the device link task), many readers. Readers never iterate
/// live state; they take a [`snapshot`](Self::snapshot) under the same lock
/// the writer uses, so a partial write is never observed.
pub struct SampleBuffer {
    capacity: usize,
    samples: RwLock<VecDeque<Sample>>,
}

impl SampleBuffer {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, sample: Sample) {
        let mut samples = self.samples.write();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Ordered copy, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.read().iter().copied().collect()
    }

    /// Values only, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.samples.read().iter().map(|s| s.value).collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.read().back().copied()
    }

    pub fn clear(&self) {
        self.samples.write().clear();
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
