//! Engine counters
//!
//! One set of counters is shared by a root logger and everything derived
//! from it.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineStats {
    pub delivered: AtomicU64,
    pub filtered: AtomicU64,
    pub diagnostics: AtomicU64,
    pub correlations_started: AtomicU64,
    pub correlations_completed: AtomicU64,
    pub correlations_failed: AtomicU64,
    pub correlations_timed_out: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub delivered: u64,
    pub filtered: u64,
    pub diagnostics: u64,
    pub correlations_started: u64,
    pub correlations_completed: u64,
    pub correlations_failed: u64,
    pub correlations_timed_out: u64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            correlations_started: self.correlations_started.load(Ordering::Relaxed),
            correlations_completed: self.correlations_completed.load(Ordering::Relaxed),
            correlations_failed: self.correlations_failed.load(Ordering::Relaxed),
            correlations_timed_out: self.correlations_timed_out.load(Ordering::Relaxed),
        }
    }

    /// Export counters as JSON
    pub fn to_json(&self) -> serde_json::Value {
        let s = self.snapshot();
        serde_json::json!({
            "records": {
                "delivered": s.delivered,
                "filtered": s.filtered,
                "diagnostics": s.diagnostics,
            },
            "correlations": {
                "started": s.correlations_started,
                "completed": s.correlations_completed,
                "failed": s.correlations_failed,
                "timed_out": s.correlations_timed_out,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_json() {
        let stats = EngineStats::new();
        EngineStats::incr(&stats.delivered);
        EngineStats::add(&stats.diagnostics, 3);
        EngineStats::incr(&stats.correlations_started);

        let snap = stats.snapshot();
        assert_eq!(snap.delivered, 1);
        assert_eq!(snap.diagnostics, 3);

        let json = stats.to_json();
        assert_eq!(json["records"]["diagnostics"], 3);
        assert_eq!(json["correlations"]["started"], 1);
        assert_eq!(json["correlations"]["timed_out"], 0);
    }
}
