//! The load factor: a scalar synthesized from independent stats.
//!
//! Each stat is scaled by its own heavy-load threshold and the scaled
//! values are summed, so any single stat crossing its threshold is
//! enough to push the composite over [`HEAVY_LOAD_VALUE`].

use std::sync::atomic::{AtomicU64, Ordering};

/// The composite value that means "heavy load".
pub const HEAVY_LOAD_VALUE: u64 = 100;

/// Per-stat heavy-load thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadThresholds {
    /// Active websocket connections considered heavy.
    pub ws_connections: u64,
    /// Active documents considered heavy.
    pub documents: u64,
    /// Active sessions considered heavy.
    pub sessions: u64,
    /// Store rough size considered heavy.
    pub rough_size: u64,
}

impl Default for LoadThresholds {
    fn default() -> Self {
        Self {
            ws_connections: 500,
            documents: 500,
            sessions: 2_000,
            rough_size: 100_000_000,
        }
    }
}

/// One sample of the independent stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Active websocket connections.
    pub ws_connections: u64,
    /// Active documents.
    pub documents: u64,
    /// Active sessions.
    pub sessions: u64,
    /// Store rough size.
    pub rough_size: u64,
}

/// The current load factor, updated by the polling task and read by
/// the traffic signal and the monitor surface.
pub struct LoadFactor {
    thresholds: LoadThresholds,
    value: AtomicU64,
}

impl LoadFactor {
    /// A load factor with the given thresholds, starting at zero.
    pub fn new(thresholds: LoadThresholds) -> Self {
        Self {
            thresholds,
            value: AtomicU64::new(0),
        }
    }

    /// Fold a fresh sample and return the new composite value.
    pub fn update(&self, stats: LoadStats) -> u64 {
        let t = &self.thresholds;
        let scaled = stats.ws_connections as f64 / t.ws_connections as f64
            + stats.documents as f64 / t.documents as f64
            + stats.sessions as f64 / t.sessions as f64
            + stats.rough_size as f64 / t.rough_size as f64;
        let value = (scaled * HEAVY_LOAD_VALUE as f64).round() as u64;
        self.value.store(value, Ordering::Relaxed);
        value
    }

    /// The most recent composite value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for LoadFactor {
    fn default() -> Self {
        Self::new(LoadThresholds::default())
    }
}
