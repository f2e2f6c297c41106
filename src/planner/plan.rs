//! Cohort query plan construction
//!
//! [`build_plan`] assembles the fixed pipeline, in order:
//!
//! 1. Filter: `low <= BMI <= high`
//! 2. Project: `BMI, Glucose, Age`
//! 3. Derive: `bmi_range = bucketize(BMI)`
//! 4. Aggregate: group by `bmi_range`; count, mean(Glucose), mean(Age)
//!
//! Planning is pure. The same options always yield equal plans, and a plan
//! does nothing until handed to the executor.

use serde::{Deserialize, Serialize};

use super::bucketizer::{Bucketizer, CANONICAL_EDGES};
use super::errors::{PlannerError, PlannerResult};
use super::predicates::Predicate;
use crate::storage::ColumnType;

pub const BMI_COLUMN: &str = "BMI";
pub const GLUCOSE_COLUMN: &str = "Glucose";
pub const AGE_COLUMN: &str = "Age";

/// Name of the derived cohort column
pub const BMI_RANGE_COLUMN: &str = "bmi_range";

/// Default inclusive BMI filter bounds
pub const DEFAULT_BMI_LOW: f64 = 10.0;
pub const DEFAULT_BMI_HIGH: f64 = 60.0;

/// Column types the plan accepts for every numeric input
pub const NUMERIC_TYPES: &[ColumnType] = &[ColumnType::Float64, ColumnType::Int64];

/// Semantic configuration of the cohort query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    pub bmi_low: f64,
    pub bmi_high: f64,
    pub bin_edges: Vec<f64>,
    pub bin_labels: Vec<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            bmi_low: DEFAULT_BMI_LOW,
            bmi_high: DEFAULT_BMI_HIGH,
            bin_edges: CANONICAL_EDGES.to_vec(),
            bin_labels: Bucketizer::canonical().labels().to_vec(),
        }
    }
}

impl PlanOptions {
    /// Validates bounds and bins without building a plan.
    pub fn validate(&self) -> PlannerResult<()> {
        self.check_bounds()?;
        Bucketizer::new(self.bin_edges.clone(), self.bin_labels.clone())?;
        Ok(())
    }

    fn check_bounds(&self) -> PlannerResult<()> {
        if !self.bmi_low.is_finite() || !self.bmi_high.is_finite() {
            return Err(PlannerError::invalid_bounds(format!(
                "BMI filter bounds must be finite, got [{}, {}]",
                self.bmi_low, self.bmi_high
            )));
        }
        if self.bmi_low > self.bmi_high {
            return Err(PlannerError::invalid_bounds(format!(
                "BMI filter lower bound {} exceeds upper bound {}",
                self.bmi_low, self.bmi_high
            )));
        }
        Ok(())
    }
}

/// Derived-column step applying the bucketizer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeriveStep {
    pub source_column: String,
    pub output_column: String,
    pub bucketizer: Bucketizer,
}

/// Group-by aggregation step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStep {
    pub group_by: String,
    /// Column averaged into `avg_glucose`
    pub glucose_column: String,
    /// Column averaged into `avg_age`
    pub age_column: String,
}

/// Immutable description of the cohort query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    /// Conjunction of row predicates
    pub filter: Vec<Predicate>,
    /// Columns read from the source, in order
    pub projection: Vec<String>,
    pub derive: DeriveStep,
    pub aggregate: AggregateStep,
}

impl QueryPlan {
    /// Columns the source must provide, each with its accepted types
    pub fn required_columns(&self) -> Vec<(&str, &'static [ColumnType])> {
        self.projection
            .iter()
            .map(|c| (c.as_str(), NUMERIC_TYPES))
            .collect()
    }

    pub fn bucketizer(&self) -> &Bucketizer {
        &self.derive.bucketizer
    }
}

/// Builds the cohort query plan. Performs no I/O.
pub fn build_plan(options: &PlanOptions) -> PlannerResult<QueryPlan> {
    options.check_bounds()?;
    let bucketizer = Bucketizer::new(options.bin_edges.clone(), options.bin_labels.clone())?;

    let projection: Vec<String> = [BMI_COLUMN, GLUCOSE_COLUMN, AGE_COLUMN]
        .iter()
        .map(|c| c.to_string())
        .collect();

    Ok(QueryPlan {
        filter: vec![
            Predicate::gte(BMI_COLUMN, options.bmi_low),
            Predicate::lte(BMI_COLUMN, options.bmi_high),
        ],
        projection,
        derive: DeriveStep {
            source_column: BMI_COLUMN.to_string(),
            output_column: BMI_RANGE_COLUMN.to_string(),
            bucketizer,
        },
        aggregate: AggregateStep {
            group_by: BMI_RANGE_COLUMN.to_string(),
            glucose_column: GLUCOSE_COLUMN.to_string(),
            age_column: AGE_COLUMN.to_string(),
        },
    })
}
