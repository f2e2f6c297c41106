//! Observable pipeline events
//!
//! Events are explicit and typed. Each carries the severity it is logged at.

use std::fmt;

use super::logger::Severity;

/// Observable events in a cohort run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration file loaded and validated
    ConfigLoaded,

    // Conversion
    /// Columnar file matches its source, conversion skipped
    ColumnarFresh,
    /// Columnar file is missing or older than its source
    ColumnarStale,
    /// Source cells stored as null because they could not be parsed
    MalformedCells,

    // Planning
    /// Plan built
    PlanBuilt,

    // Execution
    /// Columnar scan opened
    ScanOpen,
    /// Source schema rejected before the first batch (FATAL)
    SchemaRejected,
    /// One batch folded into the running accumulators
    BatchFolded,
    /// Rows skipped in a batch because a value failed coercion
    RowsSkipped,
    /// Scan aborted by corruption (FATAL)
    DataCorruption,
    /// Parallel fold workers started
    WorkersStarted,

    // Generation
    /// Synthetic source written
    SourceGenerated,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::ColumnarFresh => "COLUMNAR_FRESH",
            Event::ColumnarStale => "COLUMNAR_STALE",
            Event::MalformedCells => "MALFORMED_CELLS",
            Event::PlanBuilt => "PLAN_BUILT",
            Event::ScanOpen => "SCAN_OPEN",
            Event::SchemaRejected => "SCHEMA_REJECTED",
            Event::BatchFolded => "BATCH_FOLDED",
            Event::RowsSkipped => "ROWS_SKIPPED",
            Event::DataCorruption => "DATA_CORRUPTION",
            Event::WorkersStarted => "WORKERS_STARTED",
            Event::SourceGenerated => "SOURCE_GENERATED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::SchemaRejected | Event::DataCorruption)
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::SchemaRejected | Event::DataCorruption => Severity::Fatal,
            Event::RowsSkipped | Event::MalformedCells => Severity::Warn,
            Event::BatchFolded => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
