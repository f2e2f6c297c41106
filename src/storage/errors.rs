//! Storage error types
//!
//! Error codes:
//! - COHORT_STORAGE_IO_ERROR (ERROR severity)
//! - COHORT_STORAGE_WRITE_FAILED (ERROR severity)
//! - COHORT_STORAGE_READ_FAILED (ERROR severity)
//! - COHORT_SOURCE_INVALID (ERROR severity)
//! - COHORT_SCHEMA_MISMATCH (FATAL severity)
//! - COHORT_DATA_CORRUPTION (FATAL severity)
//!
//! Every storage error aborts the run it occurs in. FATAL additionally means
//! the file on disk cannot be trusted and re-running will not help.

use std::fmt;
use std::io;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails; retrying after fixing the environment may succeed
    Error,
    /// The input or artifact itself is unusable
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Disk I/O failure (open, seek, metadata)
    CohortStorageIoError,
    /// Columnar file write failed
    CohortStorageWriteFailed,
    /// Columnar file read failed
    CohortStorageReadFailed,
    /// Row-oriented source could not be parsed
    CohortSourceInvalid,
    /// Declared and actual column names or types disagree
    CohortSchemaMismatch,
    /// Checksum failure or structural damage in the columnar file
    CohortDataCorruption,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::CohortStorageIoError => "COHORT_STORAGE_IO_ERROR",
            StorageErrorCode::CohortStorageWriteFailed => "COHORT_STORAGE_WRITE_FAILED",
            StorageErrorCode::CohortStorageReadFailed => "COHORT_STORAGE_READ_FAILED",
            StorageErrorCode::CohortSourceInvalid => "COHORT_SOURCE_INVALID",
            StorageErrorCode::CohortSchemaMismatch => "COHORT_SCHEMA_MISMATCH",
            StorageErrorCode::CohortDataCorruption => "COHORT_DATA_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::CohortStorageIoError => Severity::Error,
            StorageErrorCode::CohortStorageWriteFailed => Severity::Error,
            StorageErrorCode::CohortStorageReadFailed => Severity::Error,
            StorageErrorCode::CohortSourceInvalid => Severity::Error,
            StorageErrorCode::CohortSchemaMismatch => Severity::Fatal,
            StorageErrorCode::CohortDataCorruption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error type with full context
#[derive(Debug)]
pub struct StorageError {
    /// Error code
    code: StorageErrorCode,
    /// Human-readable message
    message: String,
    /// Optional details about the error context
    details: Option<String>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl StorageError {
    /// Create a new storage I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::CohortStorageIoError,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a new storage write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::CohortStorageWriteFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a storage write failed error without IO source
    pub fn write_failed_no_source(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CohortStorageWriteFailed,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a new storage read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: StorageErrorCode::CohortStorageReadFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Create a source parse error at a given source record
    pub fn source_invalid(record: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CohortSourceInvalid,
            message: reason.into(),
            details: Some(format!("source_record: {}", record)),
            source: None,
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CohortSchemaMismatch,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a schema mismatch error for a missing column
    pub fn missing_column(column: &str) -> Self {
        Self {
            code: StorageErrorCode::CohortSchemaMismatch,
            message: format!("Required column '{}' is absent", column),
            details: Some(format!("column: {}", column)),
            source: None,
        }
    }

    /// Create a new data corruption error (FATAL)
    pub fn data_corruption(message: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CohortDataCorruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a data corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::CohortDataCorruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
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

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error means the artifact itself is unusable
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Returns whether this is a schema mismatch
    pub fn is_schema_mismatch(&self) -> bool {
        self.code == StorageErrorCode::CohortSchemaMismatch
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StorageErrorCode::CohortStorageIoError.code(),
            "COHORT_STORAGE_IO_ERROR"
        );
        assert_eq!(
            StorageErrorCode::CohortSchemaMismatch.code(),
            "COHORT_SCHEMA_MISMATCH"
        );
        assert_eq!(
            StorageErrorCode::CohortDataCorruption.code(),
            "COHORT_DATA_CORRUPTION"
        );
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(StorageErrorCode::CohortStorageIoError.severity(), Severity::Error);
        assert_eq!(StorageErrorCode::CohortSourceInvalid.severity(), Severity::Error);
        assert_eq!(StorageErrorCode::CohortSchemaMismatch.severity(), Severity::Fatal);
        assert_eq!(StorageErrorCode::CohortDataCorruption.severity(), Severity::Fatal);
    }

    #[test]
    fn test_missing_column_is_schema_mismatch() {
        let err = StorageError::missing_column("BMI");
        assert!(err.is_schema_mismatch());
        assert!(err.is_fatal());
        assert!(err.message().contains("BMI"));
    }

    #[test]
    fn test_io_error_not_fatal() {
        let err = StorageError::io_error(
            "open failed",
            io::Error::new(io::ErrorKind::NotFound, "no such file"),
        );
        assert!(!err.is_fatal());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_display_contains_required_fields() {
        let err = StorageError::corruption_at_offset(1024, "checksum mismatch");
        let display = format!("{}", err);
        assert!(display.contains("COHORT_DATA_CORRUPTION"));
        assert!(display.contains("FATAL"));
        assert!(display.contains("checksum mismatch"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
