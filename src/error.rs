//! Pipeline-level error
//!
//! Wraps the subsystem errors and names the stage that failed.

use std::fmt;

use thiserror::Error;

use crate::cli::{CliError, CliErrorCode};
use crate::executor::{ExecutorError, ExecutorErrorCode};
use crate::planner::PlannerError;
use crate::storage::StorageError;

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// CSV source to columnar file
    Conversion,
    /// Opening or reading the columnar file
    Scan,
    /// Folding batches into accumulators
    Fold,
    Planning,
    Config,
    /// Writing the report
    Output,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Conversion => "conversion",
            Stage::Scan => "scan",
            Stage::Fold => "fold",
            Stage::Planning => "planning",
            Stage::Config => "config",
            Stage::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Any failure of a cohort run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("conversion failed: {0}")]
    Conversion(#[source] StorageError),

    #[error("scan failed: {0}")]
    Scan(#[source] StorageError),

    #[error("{} failed: {0}", execution_stage(.0))]
    Execution(#[from] ExecutorError),

    #[error("planning failed: {0}")]
    Planning(#[from] PlannerError),

    #[error("{0}")]
    Cli(#[from] CliError),
}

fn execution_stage(e: &ExecutorError) -> Stage {
    match e.code() {
        ExecutorErrorCode::CohortExecutionWorkerFailed => Stage::Fold,
        ExecutorErrorCode::CohortExecutionInvalidOptions => Stage::Config,
        _ => Stage::Scan,
    }
}

impl PipelineError {
    /// Stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Conversion(_) => Stage::Conversion,
            PipelineError::Scan(_) => Stage::Scan,
            PipelineError::Execution(e) => execution_stage(e),
            PipelineError::Planning(_) => Stage::Planning,
            PipelineError::Cli(e) => match e.code() {
                CliErrorCode::ConfigError => Stage::Config,
                CliErrorCode::IoError => Stage::Output,
            },
        }
    }

    /// Error code of the underlying subsystem error
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Conversion(e) | PipelineError::Scan(e) => e.code().code(),
            PipelineError::Execution(e) => e.code().code(),
            PipelineError::Planning(e) => e.code().code(),
            PipelineError::Cli(e) => e.code_str(),
        }
    }

    /// Message of the underlying subsystem error
    pub fn message(&self) -> &str {
        match self {
            PipelineError::Conversion(e) | PipelineError::Scan(e) => e.message(),
            PipelineError::Execution(e) => e.message(),
            PipelineError::Planning(e) => e.message(),
            PipelineError::Cli(e) => e.message(),
        }
    }

    /// Batches folded before an execution failure, if scanning had begun
    pub fn batches_completed(&self) -> Option<u64> {
        match self {
            PipelineError::Execution(e) => e.batches_completed(),
            _ => None,
        }
    }

    /// One-line report for stderr: `CODE: <stage> failed: message`
    pub fn report(&self) -> String {
        let mut line = format!("{}: {} failed: {}", self.code(), self.stage(), self.message());
        if let Some(batches) = self.batches_completed() {
            line.push_str(&format!(" (batches completed: {})", batches));
        }
        line
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
