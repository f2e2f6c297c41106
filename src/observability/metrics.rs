//! Pipeline counters
//!
//! - Counters only, monotonic
//! - Reset only when the registry is created
//! - Thread-safe: fold workers may share one registry by reference

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Registry of pipeline counters
///
/// All counters use Relaxed ordering; readers only need eventually exact totals.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Rows written by conversions
    rows_converted: AtomicU64,
    /// Source cells stored as null because they were unparsable
    malformed_cells: AtomicU64,
    /// Batches folded
    batches_scanned: AtomicU64,
    rows_scanned: AtomicU64,
    rows_filtered: AtomicU64,
    rows_skipped: AtomicU64,
    rows_unbinned: AtomicU64,
    rows_aggregated: AtomicU64,
    /// Executions that returned a result
    executions: AtomicU64,
    /// Executions aborted by an error
    executions_failed: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    // Conversion

    pub fn add_rows_converted(&self, rows: u64) {
        self.rows_converted.fetch_add(rows, Ordering::Relaxed);
    }

    pub fn add_malformed_cells(&self, cells: u64) {
        self.malformed_cells.fetch_add(cells, Ordering::Relaxed);
    }

    // Execution

    /// Records one folded batch and how its rows were classified
    pub fn record_batch(&self, scanned: u64, filtered: u64, skipped: u64, unbinned: u64, aggregated: u64) {
        self.batches_scanned.fetch_add(1, Ordering::Relaxed);
        self.rows_scanned.fetch_add(scanned, Ordering::Relaxed);
        self.rows_filtered.fetch_add(filtered, Ordering::Relaxed);
        self.rows_skipped.fetch_add(skipped, Ordering::Relaxed);
        self.rows_unbinned.fetch_add(unbinned, Ordering::Relaxed);
        self.rows_aggregated.fetch_add(aggregated, Ordering::Relaxed);
    }

    pub fn increment_executions(&self) {
        self.executions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_executions_failed(&self) {
        self.executions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current values as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_converted: self.rows_converted.load(Ordering::Relaxed),
            malformed_cells: self.malformed_cells.load(Ordering::Relaxed),
            batches_scanned: self.batches_scanned.load(Ordering::Relaxed),
            rows_scanned: self.rows_scanned.load(Ordering::Relaxed),
            rows_filtered: self.rows_filtered.load(Ordering::Relaxed),
            rows_skipped: self.rows_skipped.load(Ordering::Relaxed),
            rows_unbinned: self.rows_unbinned.load(Ordering::Relaxed),
            rows_aggregated: self.rows_aggregated.load(Ordering::Relaxed),
            executions: self.executions.load(Ordering::Relaxed),
            executions_failed: self.executions_failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub rows_converted: u64,
    pub malformed_cells: u64,
    pub batches_scanned: u64,
    pub rows_scanned: u64,
    pub rows_filtered: u64,
    pub rows_skipped: u64,
    pub rows_unbinned: u64,
    pub rows_aggregated: u64,
    pub executions: u64,
    pub executions_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.rows_converted, 0);
        assert_eq!(snapshot.batches_scanned, 0);
        assert_eq!(snapshot.executions, 0);
    }

    #[test]
    fn test_record_batch() {
        let registry = MetricsRegistry::new();
        registry.record_batch(10, 2, 1, 0, 7);
        registry.record_batch(5, 0, 0, 1, 4);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.batches_scanned, 2);
        assert_eq!(snapshot.rows_scanned, 15);
        assert_eq!(snapshot.rows_filtered, 2);
        assert_eq!(snapshot.rows_skipped, 1);
        assert_eq!(snapshot.rows_unbinned, 1);
        assert_eq!(snapshot.rows_aggregated, 11);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_rows_converted(1234);
        registry.increment_executions();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["rows_converted"], 1234);
        assert_eq!(parsed["executions"], 1);
        assert_eq!(parsed["executions_failed"], 0);
    }

    #[test]
    fn test_thread_safety() {
        let registry = MetricsRegistry::new();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..100 {
                        registry.record_batch(3, 1, 0, 0, 2);
                    }
                });
            }
        });

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.batches_scanned, 800);
        assert_eq!(snapshot.rows_scanned, 2400);
        assert_eq!(snapshot.rows_aggregated, 1600);
    }
}
