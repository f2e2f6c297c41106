//! Explain plan output
//!
//! Renders a [`QueryPlan`] deterministically, as text or JSON.

use std::fmt;

use serde::Serialize;

use super::plan::QueryPlan;

/// One pipeline step, in execution order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainStep {
    pub step: &'static str,
    pub detail: String,
}

/// One output bin with its interval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainBin {
    pub rank: usize,
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    pub upper_inclusive: bool,
}

/// Explain plan output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainPlan {
    pub steps: Vec<ExplainStep>,
    pub bins: Vec<ExplainBin>,
    /// Output columns of the result table
    pub output: Vec<&'static str>,
}

impl ExplainPlan {
    /// Creates an explain plan from a query plan
    pub fn from_plan(plan: &QueryPlan) -> Self {
        let filter = plan
            .filter
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" AND ");

        let steps = vec![
            ExplainStep {
                step: "filter",
                detail: filter,
            },
            ExplainStep {
                step: "project",
                detail: plan.projection.join(", "),
            },
            ExplainStep {
                step: "derive",
                detail: format!(
                    "{} = bucketize({})",
                    plan.derive.output_column, plan.derive.source_column
                ),
            },
            ExplainStep {
                step: "aggregate",
                detail: format!(
                    "group by {}: count(*), mean({}), mean({})",
                    plan.aggregate.group_by, plan.aggregate.glucose_column, plan.aggregate.age_column
                ),
            },
        ];

        let bucketizer = plan.bucketizer();
        let bins = (0..bucketizer.num_bins())
            .filter_map(|rank| {
                let (lower, upper, upper_inclusive) = bucketizer.bounds(rank)?;
                Some(ExplainBin {
                    rank,
                    label: bucketizer.label(rank)?.to_string(),
                    lower,
                    upper,
                    upper_inclusive,
                })
            })
            .collect();

        Self {
            steps,
            bins,
            output: vec!["bmi_range", "avg_glucose", "patient_count", "avg_age"],
        }
    }
}

impl fmt::Display for ExplainPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN PLAN ===")?;
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{}. {:<9} {}", i + 1, step.step, step.detail)?;
        }
        writeln!(f, "Bins:")?;
        for bin in &self.bins {
            let close = if bin.upper_inclusive { ']' } else { ')' };
            writeln!(
                f,
                "  {} {:<12} [{}, {}{}",
                bin.rank, bin.label, bin.lower, bin.upper, close
            )?;
        }
        writeln!(f, "Output: {}", self.output.join(", "))?;
        Ok(())
    }
}
