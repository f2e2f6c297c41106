//! Result types for cohort execution

use serde::Serialize;

use super::accumulator::AccumulatorSet;
use crate::planner::{BmiRange, Bucketizer};

/// One output row: a non-empty bin and its aggregates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    /// Bin rank; rows are ordered by it
    #[serde(skip)]
    pub bin: usize,
    pub bmi_range: String,
    /// Typed cohort when the plan uses the canonical bins
    #[serde(skip)]
    pub cohort: Option<BmiRange>,
    pub avg_glucose: f64,
    pub patient_count: u64,
    pub avg_age: f64,
}

impl ResultRow {
    /// Finalizes every observed, non-empty bin in rank order
    pub fn from_accumulators(set: &AccumulatorSet, bucketizer: &Bucketizer) -> Vec<ResultRow> {
        set.iter()
            .filter_map(|(rank, acc)| {
                let avg_glucose = acc.avg_glucose()?;
                let avg_age = acc.avg_age()?;
                Some(ResultRow {
                    bin: rank,
                    bmi_range: bucketizer.label(rank)?.to_string(),
                    cohort: bucketizer.cohort(rank),
                    avg_glucose,
                    patient_count: acc.count,
                    avg_age,
                })
            })
            .collect()
    }
}

/// Counters produced by one execution
///
/// `rows_scanned = rows_filtered + rows_skipped + rows_unbinned + rows_aggregated`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub batches_processed: u64,
    pub rows_scanned: u64,
    pub rows_filtered: u64,
    pub rows_skipped: u64,
    pub rows_unbinned: u64,
    pub rows_aggregated: u64,
}

impl ExecutionStats {
    /// Adds another batch's counters
    pub fn merge(&mut self, other: &ExecutionStats) {
        self.batches_processed += other.batches_processed;
        self.rows_scanned += other.rows_scanned;
        self.rows_filtered += other.rows_filtered;
        self.rows_skipped += other.rows_skipped;
        self.rows_unbinned += other.rows_unbinned;
        self.rows_aggregated += other.rows_aggregated;
    }

    /// Checks that every scanned row is accounted for exactly once
    pub fn is_balanced(&self) -> bool {
        self.rows_scanned
            == self.rows_filtered + self.rows_skipped + self.rows_unbinned + self.rows_aggregated
    }
}

/// Result of a cohort execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// One row per non-empty bin, in bin order
    pub rows: Vec<ResultRow>,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    /// Sum of patient counts over all rows
    pub fn patient_total(&self) -> u64 {
        self.rows.iter().map(|r| r.patient_count).sum()
    }

    /// Looks up the row for a bin label
    pub fn row(&self, bmi_range: &str) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.bmi_range == bmi_range)
    }
}
