//! Rolling sensor history for sparkline rendering.
//!
//! Each sensor gets a fixed-capacity window of its most recent values, oldest
//! first. The first value ever pushed fills the whole window so a chart drawn
//! from a single sample is a flat line instead of a lone point.

use crate::domain::{SensorKey, SensorReading};
use std::collections::{BTreeMap, VecDeque};

/// Default number of samples kept per sensor.
pub const DEFAULT_CAPACITY: usize = 20;

/// Half-height applied to a window whose values are all equal.
const FLAT_RANGE_PAD: f64 = 1.0;

// =============================================================================
// SensorHistoryBuffer
// =============================================================================

#[derive(Debug, Clone)]
pub struct SensorHistoryBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SensorHistoryBuffer {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest once the window is full.
    ///
    /// On an empty window the sample is repeated `capacity` times.
    pub fn push(&mut self, value: f64) {
        if self.values.is_empty() {
            self.values.extend(std::iter::repeat(value).take(self.capacity));
            return;
        }

        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Current window, oldest first.
    pub fn snapshot(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Vertical extent for drawing the window.
    ///
    /// Returns `None` for an empty window. A flat window is widened by
    /// `FLAT_RANGE_PAD` on both sides so the range never has zero height.
    /// NaN samples are ignored.
    pub fn normalized_range(&self) -> Option<(f64, f64)> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &v in &self.values {
            if v.is_nan() {
                continue;
            }
            min = min.min(v);
            max = max.max(v);
        }

        if min > max {
            return None;
        }
        if min == max {
            return Some((min - FLAT_RANGE_PAD, max + FLAT_RANGE_PAD));
        }
        Some((min, max))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SensorHistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// =============================================================================
// HistoryBank
// =============================================================================

/// Buffer and last reading for one sensor.
#[derive(Debug, Clone)]
pub struct SensorTrack {
    pub buffer: SensorHistoryBuffer,
    pub latest: Option<SensorReading>,
}

/// One track per sensor key, created together when a subscription starts.
#[derive(Debug, Clone)]
pub struct HistoryBank {
    tracks: BTreeMap<SensorKey, SensorTrack>,
}

impl HistoryBank {
    pub fn new(capacity: usize) -> Self {
        let tracks = SensorKey::ALL
            .into_iter()
            .map(|key| {
                let track = SensorTrack {
                    buffer: SensorHistoryBuffer::new(capacity),
                    latest: None,
                };
                (key, track)
            })
            .collect();
        Self { tracks }
    }

    pub fn record(&mut self, reading: SensorReading) {
        if let Some(track) = self.tracks.get_mut(&reading.sensor) {
            track.buffer.push(reading.value);
            track.latest = Some(reading);
        }
    }

    pub fn track(&self, key: SensorKey) -> Option<&SensorTrack> {
        self.tracks.get(&key)
    }

    pub fn tracks(&self) -> impl Iterator<Item = (SensorKey, &SensorTrack)> {
        self.tracks.iter().map(|(k, t)| (*k, t))
    }
}
