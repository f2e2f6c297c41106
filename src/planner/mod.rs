//! Cohort query planning
//!
//! The planner turns configuration into an immutable [`QueryPlan`]: filter,
//! projection, bucketize and group-aggregate, always in that order.
//!
//! # Design Principles
//!
//! - Pure: no I/O, no clocks, no global state
//! - Deterministic: same options, equal plans
//! - Explicit: bin boundaries are data, not code paths

mod bucketizer;
mod errors;
mod explain;
mod plan;
mod predicates;

pub use bucketizer::{bucketize, BmiRange, Bucketizer, CANONICAL_EDGES};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::{ExplainBin, ExplainPlan, ExplainStep};
pub use plan::{
    build_plan, AggregateStep, DeriveStep, PlanOptions, QueryPlan, AGE_COLUMN, BMI_COLUMN,
    BMI_RANGE_COLUMN, DEFAULT_BMI_HIGH, DEFAULT_BMI_LOW, GLUCOSE_COLUMN, NUMERIC_TYPES,
};
pub use predicates::{FilterOp, Predicate};
