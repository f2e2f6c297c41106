//! Planner error types
//!
//! Error codes:
//! - COHORT_PLAN_INVALID_BOUNDS (REJECT)
//! - COHORT_PLAN_INVALID_BINS (REJECT)
//!
//! Planning performs no I/O, so every planner error is a rejected
//! configuration. Nothing has been read or written when one is returned.

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Configuration rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Filter bounds are not finite or are inverted
    CohortPlanInvalidBounds,
    /// Bin edges and labels do not describe ordered, contiguous bins
    CohortPlanInvalidBins,
}

impl PlannerErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::CohortPlanInvalidBounds => "COHORT_PLAN_INVALID_BOUNDS",
            PlannerErrorCode::CohortPlanInvalidBins => "COHORT_PLAN_INVALID_BINS",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone)]
pub struct PlannerError {
    /// Error code
    code: PlannerErrorCode,
    /// Human-readable message
    message: String,
    /// Offending configuration key if applicable
    field: Option<String>,
}

impl PlannerError {
    /// Create an invalid filter bounds error
    pub fn invalid_bounds(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::CohortPlanInvalidBounds,
            message: reason.into(),
            field: Some("bmi_filter_bounds".into()),
        }
    }

    /// Create an invalid bins error
    pub fn invalid_bins(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::CohortPlanInvalidBins,
            message: reason.into(),
            field: Some("bins".into()),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
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

    /// Returns the configuration key if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref field) = self.field {
            write!(f, " (key: {})", field)?;
        }
        Ok(())
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            PlannerErrorCode::CohortPlanInvalidBounds.code(),
            "COHORT_PLAN_INVALID_BOUNDS"
        );
        assert_eq!(
            PlannerErrorCode::CohortPlanInvalidBins.code(),
            "COHORT_PLAN_INVALID_BINS"
        );
    }

    #[test]
    fn test_all_errors_are_reject() {
        assert_eq!(PlannerError::invalid_bins("x").severity(), Severity::Reject);
        assert_eq!(PlannerError::invalid_bounds("x").severity(), Severity::Reject);
    }

    #[test]
    fn test_display_includes_key() {
        let err = PlannerError::invalid_bins("edges out of order");
        let display = format!("{}", err);
        assert!(display.contains("COHORT_PLAN_INVALID_BINS"));
        assert!(display.contains("REJECT"));
        assert!(display.contains("key: bins"));
    }
}
