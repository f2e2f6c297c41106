//! CLI command implementations
//!
//! Every command loads its configuration first and fails before touching any
//! data file if the configuration is invalid. Reports go to stdout, logs to
//! stderr.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;

use super::args::{Command, OutputFormat};
use super::config::Config;
use super::errors::CliError;
use super::io::{write_serialized, write_text};
use crate::error::{PipelineError, PipelineResult};
use crate::executor::{ExecutionResult, StreamingExecutor};
use crate::generator::generate_csv;
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry, ObservationScope};
use crate::planner::{build_plan, ExplainPlan};
use crate::presenter::{present_result, present_result_json};
use crate::storage::{
    convert_csv, is_fresh, ColumnarMetadata, ColumnarReader, ConversionStats, StorageError,
};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> PipelineResult<()> {
    Logger::route_all_to_stderr();
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> PipelineResult<()> {
    match cmd {
        Command::Convert { config } => convert(&config),
        Command::Query { config, format, stats } => query(&config, format, stats),
        Command::Run { config, format, stats } => run_pipeline(&config, format, stats),
        Command::Explain { config, format } => explain(&config, format),
        Command::Inspect { config } => inspect(&config),
        Command::Generate { rows, seed, output } => generate(rows, seed, &output),
    }
}

fn load_config(config_path: &Path) -> PipelineResult<Config> {
    let config = Config::load(config_path)?;
    if let Some(severity) = config.log_severity() {
        Logger::set_min_severity(severity);
    }
    Ok(config)
}

/// Convert the CSV source into the columnar file
pub fn convert(config_path: &Path) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let metrics = MetricsRegistry::new();
    let stats = convert_source(&config, &metrics)?;
    write_serialized(&stats)?;
    Ok(())
}

/// Runs a conversion inside a CONVERT scope
pub fn convert_source(config: &Config, metrics: &MetricsRegistry) -> PipelineResult<ConversionStats> {
    let source = config.source_path.display().to_string();
    let dest_path = config.columnar_path();
    let dest = dest_path.display().to_string();
    let scope = ObservationScope::with_fields("CONVERT", &[("source", &source), ("dest", &dest)]);

    match convert_csv(&config.source_path, &dest_path, &config.convert_options()) {
        Ok(stats) => {
            metrics.add_rows_converted(stats.rows_written);
            metrics.add_malformed_cells(stats.malformed_cells);
            if stats.malformed_cells > 0 {
                log_event_with_fields(
                    Event::MalformedCells,
                    &[
                        ("source", &source),
                        ("malformed_cells", &stats.malformed_cells.to_string()),
                    ],
                );
            }
            scope.complete_with_fields(&[
                ("rows_written", &stats.rows_written.to_string()),
                ("row_groups", &stats.metadata.row_group_count.to_string()),
                ("null_cells", &stats.null_cells.to_string()),
            ]);
            Ok(stats)
        }
        Err(e) => {
            scope.fail(e.code().code(), e.message(), e.is_fatal());
            Err(PipelineError::Conversion(e))
        }
    }
}

/// Executes the plan over the configured columnar file
pub fn execute_query(config: &Config, metrics: &MetricsRegistry) -> PipelineResult<ExecutionResult> {
    let plan = build_plan(&config.plan_options())?;
    log_event_with_fields(
        Event::PlanBuilt,
        &[
            ("bins", &plan.bucketizer().num_bins().to_string()),
            ("projection", &plan.projection.join(",")),
        ],
    );

    let reader = ColumnarReader::open(&config.columnar_path()).map_err(PipelineError::Scan)?;
    let executor = StreamingExecutor::new(plan, config.executor_options())?.with_metrics(metrics);
    Ok(executor.execute_columnar(&reader)?)
}

fn write_report(result: &ExecutionResult, format: OutputFormat, stats: bool) -> PipelineResult<()> {
    match format {
        OutputFormat::Text => write_text(&present_result(result, stats))?,
        OutputFormat::Json => {
            let json = present_result_json(result, stats).map_err(CliError::from)?;
            write_text(&json)?;
        }
    }
    Ok(())
}

/// Query the existing columnar file
pub fn query(config_path: &Path, format: OutputFormat, stats: bool) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let metrics = MetricsRegistry::new();
    let result = execute_query(&config, &metrics)?;
    write_report(&result, format, stats)
}

/// Converts when the columnar file is missing or stale, then queries it
pub fn run_pipeline(config_path: &Path, format: OutputFormat, stats: bool) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let metrics = MetricsRegistry::new();

    let columnar = config.columnar_path();
    let fresh = is_fresh(&config.source_path, &columnar).map_err(PipelineError::Conversion)?;
    let columnar_display = columnar.display().to_string();
    if fresh {
        log_event_with_fields(Event::ColumnarFresh, &[("path", &columnar_display)]);
    } else {
        log_event_with_fields(Event::ColumnarStale, &[("path", &columnar_display)]);
        convert_source(&config, &metrics)?;
    }

    let result = execute_query(&config, &metrics)?;
    write_report(&result, format, stats)
}

/// Print the plan. Reads no data files.
pub fn explain(config_path: &Path, format: OutputFormat) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let plan = build_plan(&config.plan_options())?;
    let explain = ExplainPlan::from_plan(&plan);

    match format {
        OutputFormat::Text => write_text(&explain.to_string())?,
        OutputFormat::Json => write_serialized(&explain)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct InspectReport<'a> {
    metadata: &'a ColumnarMetadata,
    /// Whether the file still matches its source
    fresh: bool,
}

/// Print columnar file metadata
pub fn inspect(config_path: &Path) -> PipelineResult<()> {
    let config = load_config(config_path)?;
    let columnar = config.columnar_path();
    let reader = ColumnarReader::open(&columnar).map_err(PipelineError::Scan)?;
    let fresh = is_fresh(&config.source_path, &columnar).unwrap_or(false);

    write_serialized(&InspectReport {
        metadata: reader.metadata(),
        fresh,
    })?;
    Ok(())
}

/// Write a synthetic source CSV
pub fn generate(rows: u64, seed: u64, output: &Path) -> PipelineResult<()> {
    let file = File::create(output).map_err(|e| {
        PipelineError::Conversion(StorageError::write_failed(
            format!("Failed to create {}", output.display()),
            e,
        ))
    })?;
    let stats = generate_csv(BufWriter::new(file), rows, seed).map_err(PipelineError::Conversion)?;

    log_event_with_fields(
        Event::SourceGenerated,
        &[
            ("path", &output.display().to_string()),
            ("rows", &stats.rows.to_string()),
            ("seed", &seed.to_string()),
        ],
    );
    write_serialized(&stats)?;
    Ok(())
}
