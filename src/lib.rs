//! cohortscan - streaming BMI cohort statistics
//!
//! Converts a row-oriented patient CSV into a columnar file once, then
//! answers the cohort query (mean glucose, mean age and patient count per
//! BMI range) by folding fixed-size batches into per-bin accumulators.
//! Memory use depends on batch size and bin count, never on input size.

pub mod cli;
pub mod error;
pub mod executor;
pub mod generator;
pub mod observability;
pub mod planner;
pub mod presenter;
pub mod storage;

pub use error::{PipelineError, PipelineResult, Stage};
