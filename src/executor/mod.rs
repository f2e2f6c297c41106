//! Streaming execution subsystem
//!
//! The executor consumes a [`QueryPlan`](crate::planner::QueryPlan) and a
//! [`BatchSource`] and produces the cohort table.
//!
//! # Execution Flow (strict order)
//!
//! 1. Validate the source schema against the plan
//! 2. Pull fixed-size batches in order
//! 3. Classify each row: filtered, skipped, unbinned or aggregated
//! 4. Fold aggregated rows into batch-local per-bin accumulators
//! 5. Merge batch partials in batch order
//! 6. Emit one row per non-empty bin, in bin order
//!
//! # Guarantees
//!
//! - Memory bounded by batch size, the file's row-group size and bin count,
//!   not input size
//! - Results independent of batch size (up to float summation order)
//! - Sequential and parallel runs are bit-identical
//! - Any scan failure aborts the run; partial results are never returned

mod accumulator;
mod engine;
mod errors;
mod filters;
mod result;
mod source;

pub use accumulator::{AccumulatorSet, GroupAccumulator};
pub use engine::{ExecutorOptions, StreamingExecutor, DEFAULT_BATCH_SIZE, MAX_WORKERS};
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity};
pub use filters::{PredicateFilter, RowOutcome};
pub use result::{ExecutionResult, ExecutionStats, ResultRow};
pub use source::{BatchSource, MemorySource};
