//! Fixed-capacity rolling buffers backing the metrics history.

use std::collections::VecDeque;

/// Fixed-length time series.
///
/// Created full (seeded with `capacity` copies of a default value) so the
/// series always has the same length; each push evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct TimeSeriesBuffer<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> TimeSeriesBuffer<T> {
    /// Create a series of `capacity` copies of `seed`.
    pub fn filled(capacity: usize, seed: T) -> Self {
        let mut samples = VecDeque::with_capacity(capacity);
        samples.extend(std::iter::repeat(seed).take(capacity));
        Self { samples, capacity }
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn push(&mut self, value: T) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Most recent sample.
    pub fn latest(&self) -> Option<&T> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.samples.iter()
    }

    /// Copy out the series, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
    }
}

impl<T: Clone + Default> TimeSeriesBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self::filled(capacity, T::default())
    }
}

/// Circular buffer of human-readable log lines, newest last.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}
