//! Configuration file loading
//!
//! A single JSON object. Only `source_path` is required:
//!
//! ```json
//! {
//!   "source_path": "data/patients.csv",
//!   "columnar_path": "data/patients.chrt",
//!   "bmi_filter_bounds": { "low": 10, "high": 60 },
//!   "bin_edges": [10, 18.5, 25, 30, 60],
//!   "bin_labels": ["Underweight", "Normal", "Overweight", "Obese"],
//!   "batch_size": 8192,
//!   "workers": 1,
//!   "row_group_size": 65536,
//!   "delimiter": ",",
//!   "log_level": "info"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::executor::{ExecutorOptions, DEFAULT_BATCH_SIZE};
use crate::observability::{log_event_with_fields, Event, Severity};
use crate::planner::{Bucketizer, PlanOptions, CANONICAL_EDGES, DEFAULT_BMI_HIGH, DEFAULT_BMI_LOW};
use crate::storage::{ConvertOptions, Schema, DEFAULT_ROW_GROUP_SIZE};

/// Extension used when `columnar_path` is not configured
pub const COLUMNAR_EXTENSION: &str = "chrt";

/// Inclusive BMI filter bounds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BmiBounds {
    pub low: f64,
    pub high: f64,
}

impl Default for BmiBounds {
    fn default() -> Self {
        Self {
            low: DEFAULT_BMI_LOW,
            high: DEFAULT_BMI_HIGH,
        }
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Row-oriented CSV source (required)
    pub source_path: PathBuf,

    /// Columnar artifact (optional, default: source path with `.chrt`)
    #[serde(default)]
    pub columnar_path: Option<PathBuf>,

    #[serde(default)]
    pub bmi_filter_bounds: BmiBounds,

    #[serde(default = "default_bin_edges")]
    pub bin_edges: Vec<f64>,

    #[serde(default = "default_bin_labels")]
    pub bin_labels: Vec<String>,

    /// Rows per batch (optional, default 8192)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Fold workers (optional, default 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rows per columnar row group (optional, default 65536)
    #[serde(default = "default_row_group_size")]
    pub row_group_size: usize,

    /// Single-byte CSV delimiter (optional, default ",")
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Source columns to keep and their types (optional, default BMI/Glucose/Age)
    #[serde(default = "Schema::patient")]
    pub columns: Schema,

    /// Minimum log severity (optional, default "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bin_edges() -> Vec<f64> {
    CANONICAL_EDGES.to_vec()
}
fn default_bin_labels() -> Vec<String> {
    Bucketizer::canonical().labels().to_vec()
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_workers() -> usize {
    1
}
fn default_row_group_size() -> usize {
    DEFAULT_ROW_GROUP_SIZE
}
fn default_delimiter() -> char {
    ','
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::config_error(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let config = Self::parse(&content)?;

        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", &path.display().to_string()),
                ("workers", &config.workers.to_string()),
                ("batch_size", &config.batch_size.to_string()),
            ],
        );
        Ok(config)
    }

    /// Parses and validates a configuration document
    pub fn parse(content: &str) -> CliResult<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> CliResult<()> {
        self.plan_options().validate().map_err(|e| {
            let key = e.field().unwrap_or("plan");
            CliError::config_error(format!("Invalid {}: {}", key, e.message()))
        })?;

        self.executor_options()
            .validate()
            .map_err(|e| CliError::config_error(e.message().to_string()))?;

        if self.row_group_size == 0 {
            return Err(CliError::config_error("row_group_size must be > 0"));
        }

        if !self.delimiter.is_ascii() || self.delimiter == '"' || self.delimiter == '\n' {
            return Err(CliError::config_error(format!(
                "Invalid delimiter {:?}: must be a single ASCII character other than quote or newline",
                self.delimiter
            )));
        }

        if self.log_severity().is_none() {
            return Err(CliError::config_error(format!(
                "Invalid log_level: '{}'. Must be trace, info, warn, error or fatal.",
                self.log_level
            )));
        }

        if self.columnar_path() == self.source_path {
            return Err(CliError::config_error(
                "columnar_path must differ from source_path",
            ));
        }

        Ok(())
    }

    /// Semantic query options
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            bmi_low: self.bmi_filter_bounds.low,
            bmi_high: self.bmi_filter_bounds.high,
            bin_edges: self.bin_edges.clone(),
            bin_labels: self.bin_labels.clone(),
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            batch_size: self.batch_size,
            workers: self.workers,
        }
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            schema: self.columns.clone(),
            row_group_size: self.row_group_size,
            // Validated as ASCII
            delimiter: self.delimiter as u8,
        }
    }

    /// Columnar artifact path, derived from the source when not configured
    pub fn columnar_path(&self) -> PathBuf {
        self.columnar_path
            .clone()
            .unwrap_or_else(|| self.source_path.with_extension(COLUMNAR_EXTENSION))
    }

    pub fn log_severity(&self) -> Option<Severity> {
        Severity::parse(&self.log_level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse(r#"{"source_path": "data/patients.csv"}"#).unwrap();
        assert_eq!(config.plan_options(), PlanOptions::default());
        assert_eq!(config.executor_options(), ExecutorOptions::default());
        assert_eq!(config.columnar_path(), PathBuf::from("data/patients.chrt"));
        assert_eq!(config.convert_options().delimiter, b',');
        assert_eq!(config.columns, Schema::patient());
        assert_eq!(config.log_severity(), Some(Severity::Info));
    }

    #[test]
    fn test_overrides() {
        let config = Config::parse(
            r#"{
                "source_path": "p.csv",
                "columnar_path": "out/p.col",
                "bmi_filter_bounds": {"low": 12, "high": 50},
                "batch_size": 100,
                "workers": 4,
                "delimiter": ";"
            }"#,
        )
        .unwrap();
        assert_eq!(config.plan_options().bmi_low, 12.0);
        assert_eq!(config.executor_options().workers, 4);
        assert_eq!(config.columnar_path(), PathBuf::from("out/p.col"));
        assert_eq!(config.convert_options().delimiter, b';');
    }

    #[test]
    fn test_missing_source_rejected() {
        let err = Config::parse("{}").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse(r#"{"source_path": "p.csv", "bach_size": 10}"#).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = Config::parse(r#"{"source_path": "p.csv", "batch_size": 0}"#).unwrap_err();
        assert!(err.message().contains("batch_size"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let err = Config::parse(
            r#"{"source_path": "p.csv", "bmi_filter_bounds": {"low": 60, "high": 10}}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("bmi_filter_bounds"));
    }

    #[test]
    fn test_mismatched_labels_rejected() {
        let err = Config::parse(
            r#"{"source_path": "p.csv", "bin_labels": ["Low", "High"]}"#,
        )
        .unwrap_err();
        assert!(err.message().contains("bins"));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        assert!(Config::parse(r#"{"source_path": "p.csv", "log_level": "loud"}"#).is_err());
    }

    #[test]
    fn test_same_paths_rejected() {
        assert!(
            Config::parse(r#"{"source_path": "p.csv", "columnar_path": "p.csv"}"#).is_err()
        );
    }
}
