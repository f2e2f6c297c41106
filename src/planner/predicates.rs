//! Row predicates used by the plan's filter step
//!
//! A filter is a conjunction of predicates over numeric columns. A null or
//! non-finite value never satisfies a predicate; the executor classifies such
//! rows before the filter is evaluated.

use std::fmt;

use serde::Serialize;

/// Comparison against a constant
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum FilterOp {
    /// column >= value
    Gte(f64),
    /// column > value
    Gt(f64),
    /// column <= value
    Lte(f64),
    /// column < value
    Lt(f64),
}

impl FilterOp {
    /// Returns the operation name for explain output
    pub fn op_name(&self) -> &'static str {
        match self {
            FilterOp::Gte(_) => "gte",
            FilterOp::Gt(_) => "gt",
            FilterOp::Lte(_) => "lte",
            FilterOp::Lt(_) => "lt",
        }
    }

    /// Returns the operator symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Gte(_) => ">=",
            FilterOp::Gt(_) => ">",
            FilterOp::Lte(_) => "<=",
            FilterOp::Lt(_) => "<",
        }
    }

    pub fn operand(&self) -> f64 {
        match self {
            FilterOp::Gte(v) | FilterOp::Gt(v) | FilterOp::Lte(v) | FilterOp::Lt(v) => *v,
        }
    }

    fn matches(&self, value: f64) -> bool {
        match *self {
            FilterOp::Gte(bound) => value >= bound,
            FilterOp::Gt(bound) => value > bound,
            FilterOp::Lte(bound) => value <= bound,
            FilterOp::Lt(bound) => value < bound,
        }
    }
}

/// A single predicate (column + operation)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub column: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

impl Predicate {
    pub fn gte(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gte(value),
        }
    }

    pub fn gt(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gt(value),
        }
    }

    pub fn lte(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Lte(value),
        }
    }

    pub fn lt(column: impl Into<String>, value: f64) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Lt(value),
        }
    }

    /// Evaluates the predicate. NaN never matches.
    pub fn matches(&self, value: f64) -> bool {
        !value.is_nan() && self.op.matches(value)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op.symbol(), self.op.operand())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_bounds() {
        let low = Predicate::gte("BMI", 10.0);
        let high = Predicate::lte("BMI", 60.0);
        assert!(low.matches(10.0));
        assert!(high.matches(60.0));
        assert!(!low.matches(9.999));
        assert!(!high.matches(60.0001));
    }

    #[test]
    fn test_exclusive_bounds() {
        assert!(!Predicate::gt("BMI", 10.0).matches(10.0));
        assert!(!Predicate::lt("BMI", 60.0).matches(60.0));
    }

    #[test]
    fn test_nan_never_matches() {
        assert!(!Predicate::gte("BMI", f64::NEG_INFINITY).matches(f64::NAN));
        assert!(!Predicate::lt("BMI", f64::INFINITY).matches(f64::NAN));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Predicate::gte("BMI", 18.5)), "BMI >= 18.5");
    }

    #[test]
    fn test_serializes_flat() {
        let json = serde_json::to_value(Predicate::lte("BMI", 60.0)).unwrap();
        assert_eq!(json["column"], "BMI");
        assert_eq!(json["op"], "lte");
        assert_eq!(json["value"], 60.0);
    }
}
