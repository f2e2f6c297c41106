//! End-to-end cohort pipeline tests
//!
//! CSV source -> columnar file -> streaming execution -> report, checking:
//! - Filter bounds and bin boundaries
//! - Batch-size invariance and idempotence
//! - Sequential/parallel equivalence
//! - Empty-bin omission
//! - Stats accounting

use std::fs;
use std::path::{Path, PathBuf};

use cohortscan::executor::{ExecutionResult, ExecutorOptions, StreamingExecutor};
use cohortscan::generator::generate_csv;
use cohortscan::planner::{build_plan, BmiRange, PlanOptions};
use cohortscan::presenter::present;
use cohortscan::storage::{convert_csv, ColumnarReader, ConvertOptions};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn write_csv(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn convert(source: &Path, row_group_size: usize) -> PathBuf {
    let dest = source.with_extension("chrt");
    let options = ConvertOptions {
        row_group_size,
        ..ConvertOptions::default()
    };
    convert_csv(source, &dest, &options).unwrap();
    dest
}

fn execute(columnar: &Path, batch_size: usize, workers: usize) -> ExecutionResult {
    execute_with(columnar, &PlanOptions::default(), batch_size, workers)
}

fn execute_with(
    columnar: &Path,
    plan_options: &PlanOptions,
    batch_size: usize,
    workers: usize,
) -> ExecutionResult {
    let plan = build_plan(plan_options).unwrap();
    let executor = StreamingExecutor::new(plan, ExecutorOptions { batch_size, workers }).unwrap();
    let reader = ColumnarReader::open(columnar).unwrap();
    executor.execute_columnar(&reader).unwrap()
}

fn generated_columnar(dir: &TempDir, rows: u64, seed: u64, row_group_size: usize) -> PathBuf {
    let source = dir.path().join("generated.csv");
    let file = fs::File::create(&source).unwrap();
    generate_csv(file, rows, seed).unwrap();
    convert(&source, row_group_size)
}

fn assert_close(a: f64, b: f64) {
    let scale = a.abs().max(b.abs()).max(1.0);
    assert!(
        (a - b).abs() / scale <= 1e-9,
        "expected {} and {} to agree within 1e-9 relative",
        a,
        b
    );
}

const EXAMPLE: &str = "Name,Age,Glucose,BMI\n\
                       p1,,,5\n\
                       p2,20,100,12\n\
                       p3,30,110,20\n\
                       p4,40,120,27\n\
                       p5,50,130,35\n\
                       p6,,,65\n";

// =============================================================================
// Core semantics
// =============================================================================

#[test]
fn test_end_to_end_example() {
    let dir = TempDir::new().unwrap();
    let columnar = convert(&write_csv(&dir, "p.csv", EXAMPLE), 4);

    let result = execute(&columnar, 2, 1);
    let rows: Vec<(&str, f64, u64, f64)> = result
        .rows
        .iter()
        .map(|r| (r.bmi_range.as_str(), r.avg_glucose, r.patient_count, r.avg_age))
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Underweight", 100.0, 1, 20.0),
            ("Normal", 110.0, 1, 30.0),
            ("Overweight", 120.0, 1, 40.0),
            ("Obese", 130.0, 1, 50.0),
        ]
    );
    assert_eq!(result.stats.rows_scanned, 6);
    assert_eq!(result.stats.rows_filtered, 2);
    assert_eq!(result.stats.rows_skipped, 0);
    let cohorts: Vec<Option<BmiRange>> = result.rows.iter().map(|r| r.cohort).collect();
    assert_eq!(
        cohorts,
        BmiRange::ALL.iter().copied().map(Some).collect::<Vec<_>>()
    );

    let table = present(&result.rows);
    assert!(table.contains("Underweight"));
    assert!(table.ends_with("(4 rows)\n"));
}

#[test]
fn test_out_of_range_never_counted() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(
        &dir,
        "p.csv",
        "Name,Age,Glucose,BMI\n\
         a,30,100,9.99\n\
         b,30,100,60.01\n\
         c,30,100,-3\n\
         d,30,100,400\n",
    );
    let result = execute(&convert(&source, 16), 16, 1);
    assert!(result.rows.is_empty());
    assert_eq!(result.stats.rows_filtered, 4);
    assert_eq!(result.stats.rows_aggregated, 0);
}

#[test]
fn test_boundary_values() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(
        &dir,
        "p.csv",
        "Name,Age,Glucose,BMI\n\
         a,20,90,10\n\
         b,21,91,18.5\n\
         c,22,92,25\n\
         d,23,93,30\n\
         e,24,94,60\n",
    );
    let result = execute(&convert(&source, 16), 16, 1);

    assert_eq!(result.row("Underweight").unwrap().patient_count, 1);
    assert_eq!(result.row("Normal").unwrap().avg_glucose, 91.0);
    assert_eq!(result.row("Overweight").unwrap().avg_glucose, 92.0);

    let obese = result.row("Obese").unwrap();
    assert_eq!(obese.patient_count, 2);
    assert_eq!(obese.avg_glucose, 93.5);
    assert_eq!(obese.avg_age, 23.5);
}

#[test]
fn test_empty_bin_omitted() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(
        &dir,
        "p.csv",
        "Name,Age,Glucose,BMI\n\
         a,20,90,12\n\
         b,30,100,22\n\
         c,40,110,29.9\n",
    );
    let result = execute(&convert(&source, 16), 16, 1);
    let labels: Vec<&str> = result.rows.iter().map(|r| r.bmi_range.as_str()).collect();
    assert_eq!(labels, vec!["Underweight", "Normal", "Overweight"]);
    assert!(result.row("Obese").is_none());
}

#[test]
fn test_malformed_cells_skip_rows_without_failing() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(
        &dir,
        "p.csv",
        "Name,Age,Glucose,BMI\n\
         a,20,90,12\n\
         b,thirty,100,22\n\
         c,40,,22\n\
         d,50,110,heavy\n",
    );
    let result = execute(&convert(&source, 16), 2, 1);
    assert_eq!(result.stats.rows_skipped, 3);
    assert_eq!(result.stats.rows_aggregated, 1);
    assert!(result.stats.is_balanced());
}

#[test]
fn test_fractional_age_counted() {
    let dir = TempDir::new().unwrap();
    let source = write_csv(&dir, "p.csv", "BMI,Glucose,Age\n22.0,100,34.5\n22.0,120,40\n");
    let result = execute(&convert(&source, 16), 16, 1);

    let normal = result.row("Normal").unwrap();
    assert_eq!(normal.patient_count, 2);
    assert_eq!(normal.avg_glucose, 110.0);
    assert_eq!(normal.avg_age, 37.25);
    assert_eq!(result.stats.rows_skipped, 0);
}

#[test]
fn test_custom_bounds_and_bins() {
    let dir = TempDir::new().unwrap();
    let columnar = convert(&write_csv(&dir, "p.csv", EXAMPLE), 4);
    let options = PlanOptions {
        bmi_low: 10.0,
        bmi_high: 40.0,
        bin_edges: vec![10.0, 25.0, 40.0],
        bin_labels: vec!["Lean".into(), "Heavy".into()],
    };
    let result = execute_with(&columnar, &options, 3, 1);

    let lean = result.row("Lean").unwrap();
    assert_eq!(lean.patient_count, 2);
    assert_eq!(lean.avg_glucose, 105.0);
    assert_eq!(result.row("Heavy").unwrap().patient_count, 2);
    assert!(result.rows.iter().all(|r| r.cohort.is_none()));
}

// =============================================================================
// Batch independence
// =============================================================================

#[test]
fn test_batch_size_invariance() {
    let dir = TempDir::new().unwrap();
    let columnar = generated_columnar(&dir, 5_000, 11, 512);

    let reference = execute(&columnar, 100_000, 1);
    assert!(!reference.rows.is_empty());

    for batch_size in [1, 100] {
        let result = execute(&columnar, batch_size, 1);
        assert_eq!(result.rows.len(), reference.rows.len());
        for (a, b) in result.rows.iter().zip(&reference.rows) {
            assert_eq!(a.bmi_range, b.bmi_range);
            assert_eq!(a.patient_count, b.patient_count);
            assert_close(a.avg_glucose, b.avg_glucose);
            assert_close(a.avg_age, b.avg_age);
        }
        assert_eq!(result.stats.rows_filtered, reference.stats.rows_filtered);
        assert_eq!(result.stats.rows_skipped, reference.stats.rows_skipped);
    }
}

#[test]
fn test_row_group_size_invariance() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let a = execute(&generated_columnar(&dir_a, 3_000, 5, 7), 250, 1);
    let b = execute(&generated_columnar(&dir_b, 3_000, 5, 4_096), 250, 1);
    // Same batches regardless of how rows are grouped on disk
    assert_eq!(a, b);
}

#[test]
fn test_idempotent() {
    let dir = TempDir::new().unwrap();
    let columnar = generated_columnar(&dir, 2_000, 3, 300);
    let first = execute(&columnar, 64, 1);
    let second = execute(&columnar, 64, 1);
    assert_eq!(first, second);
    for (a, b) in first.rows.iter().zip(&second.rows) {
        assert_eq!(a.avg_glucose.to_bits(), b.avg_glucose.to_bits());
        assert_eq!(a.avg_age.to_bits(), b.avg_age.to_bits());
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let dir = TempDir::new().unwrap();
    let columnar = generated_columnar(&dir, 4_000, 21, 500);
    let sequential = execute(&columnar, 97, 1);
    for workers in [2, 4, 8] {
        assert_eq!(execute(&columnar, 97, workers), sequential);
    }
}

// =============================================================================
// Accounting
// =============================================================================

#[test]
fn test_stats_invariant() {
    let dir = TempDir::new().unwrap();
    let columnar = generated_columnar(&dir, 6_000, 99, 1_000);
    let result = execute(&columnar, 333, 2);

    let s = result.stats;
    assert_eq!(s.rows_scanned, 6_000);
    assert_eq!(
        s.rows_scanned,
        s.rows_filtered + s.rows_skipped + s.rows_unbinned + s.rows_aggregated
    );
    assert_eq!(s.rows_aggregated, result.patient_total());
    assert_eq!(s.batches_processed, 6_000_u64.div_ceil(333));
    // The generator injects out-of-range BMIs and bad cells
    assert!(s.rows_filtered > 0);
    assert!(s.rows_skipped > 0);
}

#[test]
fn test_generator_deterministic() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    generate_csv(fs::File::create(&a).unwrap(), 1_000, 8).unwrap();
    generate_csv(fs::File::create(&b).unwrap(), 1_000, 8).unwrap();
    assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
}
