//! Result presentation
//!
//! Pure formatting of the finished cohort table. No aggregation happens here.

use serde::Serialize;

use crate::executor::{ExecutionResult, ExecutionStats, ResultRow};

const COLUMNS: [&str; 4] = ["bmi_range", "avg_glucose", "patient_count", "avg_age"];

/// Renders rows as an aligned text table.
///
/// ```text
///  bmi_range   | avg_glucose | patient_count | avg_age
/// -------------+-------------+---------------+---------
///  Underweight |      100.00 |             1 |   20.00
/// ```
pub fn present(rows: &[ResultRow]) -> String {
    let cells: Vec<[String; 4]> = rows
        .iter()
        .map(|r| {
            [
                r.bmi_range.clone(),
                format!("{:.2}", r.avg_glucose),
                r.patient_count.to_string(),
                format!("{:.2}", r.avg_age),
            ]
        })
        .collect();

    let mut widths = COLUMNS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = COLUMNS
        .iter()
        .zip(widths)
        .map(|(name, w)| format!(" {:<w$} ", name, w = w))
        .collect();
    out.push_str(header.join("|").trim_end());
    out.push('\n');

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    out.push_str(&rule.join("+"));
    out.push('\n');

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(i, (cell, w))| {
                // Label left-aligned, numbers right-aligned
                if i == 0 {
                    format!(" {:<w$} ", cell, w = w)
                } else {
                    format!(" {:>w$} ", cell, w = w)
                }
            })
            .collect();
        out.push_str(line.join("|").trim_end());
        out.push('\n');
    }

    out.push_str(&format!(
        "({} {})\n",
        rows.len(),
        if rows.len() == 1 { "row" } else { "rows" }
    ));
    out
}

/// Renders the stats footer shown under the table
pub fn present_stats(stats: &ExecutionStats) -> String {
    format!(
        "batches: {}, scanned: {}, filtered: {}, skipped: {}, unbinned: {}, aggregated: {}\n",
        stats.batches_processed,
        stats.rows_scanned,
        stats.rows_filtered,
        stats.rows_skipped,
        stats.rows_unbinned,
        stats.rows_aggregated
    )
}

/// Renders a full report: the table, plus the stats footer if requested
pub fn present_result(result: &ExecutionResult, with_stats: bool) -> String {
    let mut out = present(&result.rows);
    if with_stats {
        out.push_str(&present_stats(&result.stats));
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    rows: &'a [ResultRow],
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<&'a ExecutionStats>,
}

/// Renders rows as a JSON array of objects with exactly the four output columns.
pub fn present_json(rows: &[ResultRow]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rows)
}

/// Renders `{"rows": [...], "stats": {...}}`, omitting stats unless requested
pub fn present_result_json(result: &ExecutionResult, with_stats: bool) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        rows: &result.rows,
        stats: with_stats.then_some(&result.stats),
    })
}
