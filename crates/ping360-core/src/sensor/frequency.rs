//! Per-message rate tracking
//!
//! Observability only: the driver never makes decisions from these numbers.

use std::collections::HashMap;
use std::time::Duration;

/// Weight of the newest interval in the smoothed rate
const SMOOTHING: f64 = 0.2;

/// Rate estimate for one message id
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MessageFrequency {
    /// Time of the latest sighting, relative to the tracker clock
    pub last_seen: Duration,
    /// Smoothed rate in Hz
    pub frequency: f64,
    pub count: u64,
}

/// Message id to rate map
#[derive(Debug, Clone, Default)]
pub struct FrequencyTracker {
    entries: HashMap<u16, MessageFrequency>,
}

impl FrequencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting of `id` at `elapsed`; returns the updated rate
    pub fn record(&mut self, id: u16, elapsed: Duration) -> f64 {
        let entry = self.entries.entry(id).or_default();
        entry.count += 1;

        if entry.count > 1 {
            let interval = elapsed.saturating_sub(entry.last_seen).as_secs_f64();
            if interval > 0.0 {
                let instant = 1.0 / interval;
                entry.frequency = if entry.count == 2 {
                    instant
                } else {
                    entry.frequency * (1.0 - SMOOTHING) + instant * SMOOTHING
                };
            }
        }

        entry.last_seen = elapsed;
        entry.frequency
    }

    pub fn get(&self, id: u16) -> Option<&MessageFrequency> {
        self.entries.get(&id)
    }

    /// Current rate of every id seen so far
    pub fn frequencies(&self) -> HashMap<u16, f64> {
        self.entries
            .iter()
            .map(|(&id, entry)| (id, entry.frequency))
            .collect()
    }
}
