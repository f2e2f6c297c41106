//! Synthetic patient source generation
//!
//! Produces a deterministic `Name,Age,Glucose,BMI` CSV for a given seed. A
//! small share of rows carries out-of-range BMIs, blank cells or unparsable
//! text so the filter and skip paths see real traffic.

use std::io::Write;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::planner::{bucketize, BmiRange};
use crate::storage::{StorageError, StorageResult};

pub const HEADER: [&str; 4] = ["Name", "Age", "Glucose", "BMI"];

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bruno", "Chen", "Dara", "Elif", "Farah", "Goran", "Hana", "Ivo", "Jun", "Kemi",
    "Lars", "Mina", "Nico", "Oona", "Priya",
];
const LAST_NAMES: &[&str] = &[
    "Okafor", "Lindqvist", "Moreau", "Tanaka", "Novak", "Silva", "Haddad", "Kowalski", "Reyes",
    "Byrne",
];

/// Per-mille rates of injected anomalies
const OUT_OF_RANGE_PER_MILLE: u32 = 20;
const BLANK_PER_MILLE: u32 = 10;
const MALFORMED_PER_MILLE: u32 = 5;

/// Counts of what was written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GeneratorStats {
    pub rows: u64,
    pub out_of_range_bmi: u64,
    pub blank_cells: u64,
    pub malformed_cells: u64,
    /// In-range BMIs drawn per canonical cohort, in rank order
    pub cohort_rows: [u64; 4],
}

struct PatientGenerator {
    rng: StdRng,
    stats: GeneratorStats,
}

impl PatientGenerator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            stats: GeneratorStats::default(),
        }
    }

    fn roll(&mut self, per_mille: u32) -> bool {
        self.rng.gen_range(0..1000) < per_mille
    }

    fn name(&mut self) -> String {
        let first = FIRST_NAMES[self.rng.gen_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[self.rng.gen_range(0..LAST_NAMES.len())];
        format!("{} {}", first, last)
    }

    fn bmi(&mut self) -> f64 {
        if self.roll(OUT_OF_RANGE_PER_MILLE) {
            self.stats.out_of_range_bmi += 1;
            if self.rng.gen_bool(0.5) {
                self.rng.gen_range(3.0..9.9)
            } else {
                self.rng.gen_range(60.5..90.0)
            }
        } else {
            // Rough adult distribution centred near 27
            let spread: f64 = (0..4).map(|_| self.rng.gen_range(-4.5..4.5)).sum();
            (27.0 + spread).clamp(12.0, 58.0)
        }
    }

    /// Renders a numeric cell, occasionally blank or garbled
    fn cell(&mut self, value: String) -> String {
        if self.roll(BLANK_PER_MILLE) {
            self.stats.blank_cells += 1;
            String::new()
        } else if self.roll(MALFORMED_PER_MILLE) {
            self.stats.malformed_cells += 1;
            "n/a".to_string()
        } else {
            value
        }
    }

    fn record(&mut self) -> [String; 4] {
        let name = self.name();
        let age = self.rng.gen_range(18..90).to_string();
        let glucose = format!("{:.1}", self.rng.gen_range(65.0..199.0));
        // Rounded before bucketing so the count matches the written cell
        let bmi = (self.bmi() * 10.0).round() / 10.0;
        if let Some(range) = bucketize(bmi) {
            self.stats.cohort_rows[range.rank()] += 1;
        }
        let bmi = format!("{:.1}", bmi);
        [name, self.cell(age), self.cell(glucose), self.cell(bmi)]
    }
}

/// Writes `rows` synthetic patient records to `writer`.
///
/// The same seed always produces the same bytes.
pub fn generate_csv<W: Write>(writer: W, rows: u64, seed: u64) -> StorageResult<GeneratorStats> {
    let mut csv = csv::Writer::from_writer(writer);
    let mut generator = PatientGenerator::new(seed);

    csv.write_record(HEADER).map_err(write_error)?;
    for _ in 0..rows {
        let record = generator.record();
        csv.write_record(&record).map_err(write_error)?;
        generator.stats.rows += 1;
    }
    csv.flush()
        .map_err(|e| StorageError::write_failed("Failed to flush generated source", e))?;

    Ok(generator.stats)
}

fn write_error(e: csv::Error) -> StorageError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => StorageError::write_failed("Failed to write generated source", io),
        other => StorageError::write_failed_no_source(format!(
            "Failed to write generated source: {:?}",
            other
        )),
    }
}
