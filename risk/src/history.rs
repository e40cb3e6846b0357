//! Displacement history
//!
//! Time-bounded sliding windows over each sensor's displacement, kept with
//! running sums so the 1 h mean and deviation are O(1) to read.

use chrono::{DateTime, Duration, Utc};
use geoguard_sim::SensorReading;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Hard cap on samples per window, independent of the time span
pub const DEFAULT_MAX_SAMPLES: usize = 7200;

/// Sliding window of timestamped samples bounded by age and count
#[derive(Debug, Clone)]
pub struct TimedWindow {
    data: VecDeque<(DateTime<Utc>, f64)>,
    span: Duration,
    max_samples: usize,
    sum: f64,
    sum_sq: f64,
}

impl TimedWindow {
    pub fn new(span: Duration, max_samples: usize) -> Self {
        Self {
            data: VecDeque::new(),
            span,
            max_samples: max_samples.max(1),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Add a sample. Returns false when it is not newer than the last one.
    pub fn push(&mut self, at: DateTime<Utc>, value: f64) -> bool {
        if let Some(&(last, _)) = self.data.back() {
            if at <= last {
                return false;
            }
        }

        self.data.push_back((at, value));
        self.sum += value;
        self.sum_sq += value * value;

        while self.data.len() > self.max_samples {
            self.pop_front();
        }
        self.evict_before(at - self.span);
        true
    }

    fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        while matches!(self.data.front(), Some(&(t, _)) if t < cutoff) {
            self.pop_front();
        }
    }

    fn pop_front(&mut self) {
        if let Some((_, old)) = self.data.pop_front() {
            self.sum -= old;
            self.sum_sq -= old * old;
        }
        if self.data.is_empty() {
            self.sum = 0.0;
            self.sum_sq = 0.0;
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.data.back().map(|&(_, v)| v)
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.sum / self.data.len() as f64
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.data.len() < 2 {
            return 0.0;
        }
        let n = self.data.len() as f64;
        ((self.sum_sq - (self.sum * self.sum) / n) / (n - 1.0)).max(0.0)
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Displacement statistics fed to the scorer
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplacementStats {
    pub last_mm: f64,
    pub mean_1h_mm: f64,
    pub std_1h_mm: f64,
    pub samples: usize,
}

/// Per-sensor displacement windows
#[derive(Debug, Clone)]
pub struct DisplacementHistory {
    windows: HashMap<String, TimedWindow>,
    span: Duration,
    max_samples: usize,
}

impl DisplacementHistory {
    pub fn new(span: Duration) -> Self {
        Self::with_capacity(span, DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(span: Duration, max_samples: usize) -> Self {
        Self {
            windows: HashMap::new(),
            span,
            max_samples,
        }
    }

    /// Record displacement from every reading. Every category carries a
    /// displacement channel, and tremors shift all of them.
    pub fn record(&mut self, readings: &[SensorReading]) -> usize {
        let (span, max_samples) = (self.span, self.max_samples);
        let mut recorded = 0;

        for reading in readings {
            let window = self
                .windows
                .entry(reading.sensor_id.clone())
                .or_insert_with(|| TimedWindow::new(span, max_samples));

            if window.push(reading.timestamp, reading.values.displacement_mm) {
                recorded += 1;
            }
        }

        recorded
    }

    pub fn stats(&self, sensor_id: &str) -> Option<DisplacementStats> {
        let window = self.windows.get(sensor_id)?;
        Some(DisplacementStats {
            last_mm: window.last()?,
            mean_1h_mm: window.mean(),
            std_1h_mm: window.std_dev(),
            samples: window.len(),
        })
    }

    pub fn sensor_count(&self) -> usize {
        self.windows.len()
    }
}
