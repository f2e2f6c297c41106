//! Row filtering and classification for batch folds
//!
//! Every scanned row lands in exactly one outcome:
//!
//! 1. BMI null or non-finite: skipped
//! 2. BMI fails a filter predicate: filtered
//! 3. Glucose or Age null or non-finite: skipped
//! 4. BMI outside the bin edges: unbinned
//! 5. Otherwise: aggregated into its bin

use crate::planner::{Bucketizer, Predicate, QueryPlan};
use crate::storage::{Batch, ColumnData, Schema, StorageError, StorageResult};

/// Outcome of classifying one row
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RowOutcome {
    Filtered,
    /// The column at this batch position held a null or non-finite value
    Skipped(usize),
    Unbinned,
    Aggregated { rank: usize, glucose: f64, age: f64 },
}

/// A predicate resolved to a column position
#[derive(Debug, Clone)]
struct BoundPredicate {
    index: usize,
    predicate: Predicate,
}

/// Plan predicates and bucketizer bound to batch column positions
#[derive(Debug, Clone)]
pub struct PredicateFilter {
    predicates: Vec<BoundPredicate>,
    bucketizer: Bucketizer,
    bmi: usize,
    glucose: usize,
    age: usize,
}

impl PredicateFilter {
    /// Binds the plan to `schema`. Fails if a referenced column is absent.
    pub fn bind(plan: &QueryPlan, schema: &Schema) -> StorageResult<Self> {
        let position = |name: &str| {
            schema
                .index_of(name)
                .ok_or_else(|| StorageError::missing_column(name))
        };

        let predicates = plan
            .filter
            .iter()
            .map(|p| {
                Ok(BoundPredicate {
                    index: position(&p.column)?,
                    predicate: p.clone(),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(Self {
            predicates,
            bucketizer: plan.bucketizer().clone(),
            bmi: position(&plan.derive.source_column)?,
            glucose: position(&plan.aggregate.glucose_column)?,
            age: position(&plan.aggregate.age_column)?,
        })
    }

    /// Classifies row `row` of `batch`
    pub fn classify(&self, batch: &Batch, row: usize) -> RowOutcome {
        let columns = batch.columns();

        let bmi = match finite(&columns[self.bmi], row) {
            Some(v) => v,
            None => return RowOutcome::Skipped(self.bmi),
        };

        // All predicates must match (AND semantics)
        let passes = self.predicates.iter().all(|bound| {
            if bound.index == self.bmi {
                bound.predicate.matches(bmi)
            } else {
                finite(&columns[bound.index], row).map_or(false, |v| bound.predicate.matches(v))
            }
        });
        if !passes {
            return RowOutcome::Filtered;
        }

        let glucose = match finite(&columns[self.glucose], row) {
            Some(v) => v,
            None => return RowOutcome::Skipped(self.glucose),
        };
        let age = match finite(&columns[self.age], row) {
            Some(v) => v,
            None => return RowOutcome::Skipped(self.age),
        };

        match self.bucketizer.bin_for(bmi) {
            Some(rank) => RowOutcome::Aggregated { rank, glucose, age },
            None => RowOutcome::Unbinned,
        }
    }

    pub fn bucketizer(&self) -> &Bucketizer {
        &self.bucketizer
    }
}

fn finite(column: &ColumnData, row: usize) -> Option<f64> {
    column.numeric(row).filter(|v| v.is_finite())
}
