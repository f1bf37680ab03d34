//! Stats logging interface
//!
//! The actual metrics sink (statsd, tracing, a test recorder) lives behind
//! this trait so pipeline components can count outcomes without knowing
//! where the numbers go.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

/// Counter and timing sink used throughout the pipeline.
pub trait StatsLogger: Send + Sync {
    /// Add `count` to the named counter.
    fn incr_by(&self, name: &str, count: i64);

    /// Record an elapsed duration under the named timer.
    fn timing(&self, name: &str, elapsed: Duration);

    /// Increment the named counter by one.
    fn incr(&self, name: &str) {
        self.incr_by(name, 1);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStats;

impl StatsLogger for NoopStats {
    fn incr_by(&self, _name: &str, _count: i64) {}
    fn timing(&self, _name: &str, _elapsed: Duration) {}
}

/// Records counters in memory for inspection.
///
/// Used by tests and by diagnostics commands that want to dump counters on
/// shutdown.
#[derive(Debug, Default)]
pub struct RecordingStats {
    counters: Mutex<HashMap<String, i64>>,
    timings: Mutex<HashMap<String, Vec<Duration>>>,
}

impl RecordingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a counter, zero if never incremented.
    pub fn counter(&self, name: &str) -> i64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    /// All counters, cloned.
    pub fn counters(&self) -> HashMap<String, i64> {
        self.counters.lock().clone()
    }

    /// Number of timings recorded under a name.
    pub fn timing_count(&self, name: &str) -> usize {
        self.timings.lock().get(name).map_or(0, Vec::len)
    }
}

impl StatsLogger for RecordingStats {
    fn incr_by(&self, name: &str, count: i64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += count;
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        self.timings
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(elapsed);
    }
}
