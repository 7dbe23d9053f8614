use super::types::Sample;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Bounded, time-ordered window of samples for one derived statistic.
///
/// Oldest samples are evicted first once `capacity` is reached. Samples are kept in
/// arrival order: a `record` with an older timestamp than the newest stored one is
/// appended as-is.
#[derive(Debug)]
pub struct SampledHistory<T> {
    samples: RwLock<VecDeque<Sample<T>>>,
    capacity: usize,
}

impl<T: Copy> SampledHistory<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: RwLock::new(VecDeque::with_capacity(capacity)), capacity }
    }

    pub fn record(&self, value: T, timestamp: u64) {
        let mut samples = self.samples.write();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(Sample::new(timestamp, value));
    }

    /// Retained samples with `timestamp >= since`, oldest first.
    pub fn query(&self, since: u64) -> Vec<Sample<T>> {
        self.samples.read().iter().filter(|s| s.timestamp >= since).copied().collect()
    }

    pub fn latest(&self) -> Option<Sample<T>> {
        self.samples.read().back().copied()
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

    pub fn clear(&self) {
        self.samples.write().clear();
    }
}
