//! Per-snapshot load history for the metrics panel.

use std::collections::VecDeque;

pub const DEFAULT_SERIES_CAPACITY: usize = 120;

#[derive(Clone, Debug, PartialEq)]
pub struct LoadSample {
    /// Position of the snapshot in the session, starting at 1.
    pub sequence: u64,
    /// Optimization step reported by the producer, if any.
    pub step: Option<u64>,
    pub total_load: f64,
    pub cost: Option<f64>,
    pub migrations: usize,
}

/// Bounded history; the oldest sample is evicted first.
#[derive(Clone, Debug)]
pub struct LoadSeries {
    capacity: usize,
    samples: VecDeque<LoadSample>,
}

impl Default for LoadSeries {
    fn default() -> Self {
        Self::new(DEFAULT_SERIES_CAPACITY)
    }
}

impl LoadSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: LoadSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LoadSample> + ExactSizeIterator {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&LoadSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn peak_load(&self) -> f64 {
        self.samples
            .iter()
            .map(|sample| sample.total_load)
            .fold(0.0, f64::max)
    }

    /// Relative change of total load between the last two samples, in
    /// percent. `None` until two samples exist or when the earlier one is
    /// zero.
    pub fn change_percent(&self) -> Option<f64> {
        let mut recent = self.samples.iter().rev();
        let latest = recent.next()?;
        let previous = recent.next()?;
        if previous.total_load == 0.0 {
            return None;
        }
        Some((latest.total_load - previous.total_load) / previous.total_load * 100.0)
    }

    pub fn total_migrations(&self) -> usize {
        self.samples.iter().map(|sample| sample.migrations).sum()
    }
}
