//! Observation scopes for pipeline stages
//!
//! A scope logs `<NAME>_BEGIN` when opened and exactly one closing event:
//! `<NAME>_COMPLETE`, `<NAME>_FAILED`, or `<NAME>_INCOMPLETE` if it is dropped
//! without being closed. Closing events carry `elapsed_ms`.

use std::time::Instant;

use super::logger::{Logger, Severity};

/// A stage scope with begin/close logging
///
/// ```ignore
/// let scope = ObservationScope::with_fields("CONVERT", &[("source", "p.csv")]);
/// match convert() {
///     Ok(stats) => scope.complete_with_fields(&[("rows", &stats.rows.to_string())]),
///     Err(e) => scope.fail(e.code(), &e.to_string(), e.is_fatal()),
/// }
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    fields: Vec<(&'a str, String)>,
    timer: Timer,
    closed: bool,
}

impl<'a> ObservationScope<'a> {
    /// Opens a scope, logging `{name}_BEGIN`.
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Opens a scope whose fields are repeated on every event it logs.
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
            closed: false,
        }
    }

    /// Returns the scope name
    pub fn name(&self) -> &str {
        self.name
    }

    fn close(mut self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        self.closed = true;
        let elapsed = self.timer.elapsed_ms();
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend(extra.iter().copied());
        fields.push(("elapsed_ms", elapsed.as_str()));
        Logger::log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }

    /// Logs `{name}_COMPLETE` at INFO.
    pub fn complete(self) {
        self.close(Severity::Info, "COMPLETE", &[]);
    }

    /// Logs `{name}_COMPLETE` at INFO with result fields.
    pub fn complete_with_fields(self, extra: &[(&str, &str)]) {
        self.close(Severity::Info, "COMPLETE", extra);
    }

    /// Logs `{name}_FAILED` at ERROR, or FATAL when `fatal` is set.
    pub fn fail(self, code: &str, reason: &str, fatal: bool) {
        let severity = if fatal { Severity::Fatal } else { Severity::Error };
        self.close(severity, "FAILED", &[("code", code), ("reason", reason)]);
    }

    /// Check if the scope has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.closed {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Wall-clock timer for elapsed-time fields
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_starts_open() {
        let scope = ObservationScope::new("TEST");
        assert!(!scope.is_closed());
        assert_eq!(scope.name(), "TEST");
        scope.complete();
    }

    #[test]
    fn test_scope_with_fields() {
        let scope = ObservationScope::with_fields("CONVERT", &[("source", "p.csv")]);
        scope.complete_with_fields(&[("rows", "12")]);
    }

    #[test]
    fn test_scope_fail() {
        let scope = ObservationScope::new("EXECUTE");
        scope.fail("COHORT_DATA_CORRUPTION", "checksum mismatch", true);
    }

    #[test]
    fn test_scope_drop_without_close() {
        let scope = ObservationScope::new("TEST");
        drop(scope);
    }

    #[test]
    fn test_timer_parses() {
        let timer = Timer::new();
        assert!(timer.elapsed_ms().parse::<u128>().is_ok());
    }
}
