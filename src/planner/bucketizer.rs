//! BMI range bucketizer
//!
//! Bins are half-open `[edge_i, edge_i+1)` with the last bin closed on the
//! right. With the canonical edges `[10, 18.5, 25, 30, 60]`:
//!
//! | BMI          | Bin         |
//! |--------------|-------------|
//! | `< 10`       | excluded    |
//! | `[10, 18.5)` | Underweight |
//! | `[18.5, 25)` | Normal      |
//! | `[25, 30)`   | Overweight  |
//! | `[30, 60]`   | Obese       |
//! | `> 60`       | excluded    |

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{PlannerError, PlannerResult};

/// Canonical bin edges
pub const CANONICAL_EDGES: [f64; 5] = [10.0, 18.5, 25.0, 30.0, 60.0];

/// One of the four canonical BMI cohorts, in rank order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BmiRange {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiRange {
    pub const ALL: [BmiRange; 4] = [
        BmiRange::Underweight,
        BmiRange::Normal,
        BmiRange::Overweight,
        BmiRange::Obese,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BmiRange::Underweight => "Underweight",
            BmiRange::Normal => "Normal",
            BmiRange::Overweight => "Overweight",
            BmiRange::Obese => "Obese",
        }
    }

    /// Position in the canonical ordering
    pub fn rank(&self) -> usize {
        *self as usize
    }

    pub fn from_rank(rank: usize) -> Option<Self> {
        Self::ALL.get(rank).copied()
    }
}

impl fmt::Display for BmiRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps a BMI value to its canonical cohort, or `None` when excluded.
pub fn bucketize(bmi: f64) -> Option<BmiRange> {
    bin_index(&CANONICAL_EDGES, bmi).and_then(BmiRange::from_rank)
}

fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    let (first, last) = (*edges.first()?, *edges.last()?);
    if value.is_nan() || value < first || value > last {
        return None;
    }
    // Number of edges <= value; at least 1 because value >= first
    let upper = edges.partition_point(|edge| *edge <= value);
    Some((upper - 1).min(edges.len() - 2))
}

/// Configurable bucketizer: `labels.len()` bins over `labels.len() + 1` edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucketizer {
    edges: Vec<f64>,
    labels: Vec<String>,
}

impl Bucketizer {
    /// Creates a bucketizer after checking that edges are finite and strictly
    /// increasing and that every bin has a unique, non-empty label.
    pub fn new(edges: Vec<f64>, labels: Vec<String>) -> PlannerResult<Self> {
        if labels.is_empty() {
            return Err(PlannerError::invalid_bins("At least one bin label is required"));
        }
        if edges.len() != labels.len() + 1 {
            return Err(PlannerError::invalid_bins(format!(
                "{} labels need {} edges, got {}",
                labels.len(),
                labels.len() + 1,
                edges.len()
            )));
        }
        if let Some(edge) = edges.iter().find(|e| !e.is_finite()) {
            return Err(PlannerError::invalid_bins(format!(
                "Bin edge {} is not finite",
                edge
            )));
        }
        if let Some(pair) = edges.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PlannerError::invalid_bins(format!(
                "Bin edges must be strictly increasing: {} is followed by {}",
                pair[0], pair[1]
            )));
        }
        for (i, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(PlannerError::invalid_bins(format!("Bin {} has an empty label", i)));
            }
            if labels[..i].contains(label) {
                return Err(PlannerError::invalid_bins(format!(
                    "Duplicate bin label '{}'",
                    label
                )));
            }
        }
        Ok(Self { edges, labels })
    }

    /// The four canonical BMI cohorts
    pub fn canonical() -> Self {
        Self {
            edges: CANONICAL_EDGES.to_vec(),
            labels: BmiRange::ALL.iter().map(|r| r.as_str().to_string()).collect(),
        }
    }

    /// Returns the bin rank for `value`, or `None` if it lies outside the
    /// edges or is NaN.
    pub fn bin_for(&self, value: f64) -> Option<usize> {
        bin_index(&self.edges, value)
    }

    /// True when edges and labels are the canonical cohorts
    pub fn is_canonical(&self) -> bool {
        self.edges == CANONICAL_EDGES
            && self
                .labels
                .iter()
                .zip(BmiRange::ALL)
                .all(|(label, range)| label == range.as_str())
            && self.labels.len() == BmiRange::ALL.len()
    }

    /// The canonical cohort for `rank`, or `None` for custom bins
    pub fn cohort(&self, rank: usize) -> Option<BmiRange> {
        if self.is_canonical() {
            BmiRange::from_rank(rank)
        } else {
            None
        }
    }

    pub fn label(&self, rank: usize) -> Option<&str> {
        self.labels.get(rank).map(String::as_str)
    }

    pub fn num_bins(&self) -> usize {
        self.labels.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Lower edge, upper edge, and whether the upper edge is inclusive
    pub fn bounds(&self, rank: usize) -> Option<(f64, f64, bool)> {
        if rank >= self.num_bins() {
            return None;
        }
        Some((
            self.edges[rank],
            self.edges[rank + 1],
            rank + 1 == self.num_bins(),
        ))
    }
}
