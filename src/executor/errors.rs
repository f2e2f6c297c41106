//! Executor error types
//!
//! Error codes:
//! - COHORT_EXECUTION_SCHEMA_INVALID (FATAL): the source cannot serve the
//!   plan; raised before any batch is read
//! - COHORT_EXECUTION_SCAN_FAILED (ERROR): I/O failure mid-scan
//! - COHORT_DATA_CORRUPTION (FATAL): checksum or structural failure mid-scan
//! - COHORT_EXECUTION_WORKER_FAILED (ERROR): a fold worker panicked
//! - COHORT_EXECUTION_INVALID_OPTIONS (REJECT): batch size or worker count
//!
//! Every executor error aborts the execution; no partial result is returned.
//! Errors raised after scanning began report how many batches completed.

use std::fmt;

use crate::storage::StorageError;

/// Severity levels for executor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Configuration rejected before execution
    Reject,
    /// Execution failed; the input may be fine
    Error,
    /// The input cannot be processed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    CohortExecutionSchemaInvalid,
    CohortExecutionScanFailed,
    CohortDataCorruption,
    CohortExecutionWorkerFailed,
    CohortExecutionInvalidOptions,
}

impl ExecutorErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::CohortExecutionSchemaInvalid => "COHORT_EXECUTION_SCHEMA_INVALID",
            ExecutorErrorCode::CohortExecutionScanFailed => "COHORT_EXECUTION_SCAN_FAILED",
            ExecutorErrorCode::CohortDataCorruption => "COHORT_DATA_CORRUPTION",
            ExecutorErrorCode::CohortExecutionWorkerFailed => "COHORT_EXECUTION_WORKER_FAILED",
            ExecutorErrorCode::CohortExecutionInvalidOptions => "COHORT_EXECUTION_INVALID_OPTIONS",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ExecutorErrorCode::CohortExecutionSchemaInvalid => Severity::Fatal,
            ExecutorErrorCode::CohortDataCorruption => Severity::Fatal,
            ExecutorErrorCode::CohortExecutionInvalidOptions => Severity::Reject,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Executor error type with full context
#[derive(Debug)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
    /// Batches fully folded before the failure, once scanning has begun
    batches_completed: Option<u64>,
    source: Option<StorageError>,
}

impl ExecutorError {
    /// The source schema cannot serve the plan. No batch was read.
    pub fn schema_invalid(source: StorageError) -> Self {
        Self {
            code: ExecutorErrorCode::CohortExecutionSchemaInvalid,
            message: format!("Source schema rejected: {}", source.message()),
            batches_completed: Some(0),
            source: Some(source),
        }
    }

    /// The scan failed after `batches_completed` batches were folded.
    pub fn scan_failed(source: StorageError, batches_completed: u64) -> Self {
        let code = if source.is_fatal() {
            ExecutorErrorCode::CohortDataCorruption
        } else {
            ExecutorErrorCode::CohortExecutionScanFailed
        };
        Self {
            code,
            message: format!(
                "Scan aborted after {} completed batches: {}",
                batches_completed,
                source.message()
            ),
            batches_completed: Some(batches_completed),
            source: Some(source),
        }
    }

    /// A fold worker died without returning its partial result.
    pub fn worker_failed(reason: impl Into<String>, batches_completed: u64) -> Self {
        Self {
            code: ExecutorErrorCode::CohortExecutionWorkerFailed,
            message: reason.into(),
            batches_completed: Some(batches_completed),
            source: None,
        }
    }

    /// Execution options were rejected before any work started.
    pub fn invalid_options(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::CohortExecutionInvalidOptions,
            message: reason.into(),
            batches_completed: None,
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ExecutorErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Batches folded before the failure, if scanning had begun
    pub fn batches_completed(&self) -> Option<u64> {
        self.batches_completed
    }

    /// Underlying storage error, if any
    pub fn storage_error(&self) -> Option<&StorageError> {
        self.source.as_ref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns whether the source schema was rejected before scanning
    pub fn is_schema_error(&self) -> bool {
        self.code == ExecutorErrorCode::CohortExecutionSchemaInvalid
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(batches) = self.batches_completed {
            write!(f, " (batches_completed: {})", batches)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
