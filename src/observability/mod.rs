//! Observability for cohort runs
//!
//! - Structured logging (one JSON object per line)
//! - Typed lifecycle events
//! - Atomic pipeline counters
//! - Stage scopes with begin/complete/failed events
//!
//! # Principles
//!
//! 1. Observability is read-only: it never changes results
//! 2. Synchronous, no background threads
//! 3. Deterministic output for identical inputs
//!
//! # Usage
//!
//! ```ignore
//! use cohortscan::observability::{log_event_with_fields, Event, MetricsRegistry, ObservationScope};
//!
//! log_event_with_fields(Event::ScanOpen, &[("path", "patients.chrt")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_executions();
//!
//! let scope = ObservationScope::new("EXECUTE");
//! // ... run ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields at its own severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
