//! CLI argument definitions using clap
//!
//! Commands:
//! - cohortscan convert --config <path>
//! - cohortscan query --config <path> [--format text|json] [--stats]
//! - cohortscan run --config <path> [--format text|json] [--stats]
//! - cohortscan explain --config <path> [--format text|json]
//! - cohortscan inspect --config <path>
//! - cohortscan generate --rows <n> --seed <s> --output <csv>

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// cohortscan - streaming BMI cohort statistics over columnar patient data
#[derive(Parser, Debug)]
#[command(name = "cohortscan")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Report rendering
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned text table
    #[default]
    Text,
    /// JSON document
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert the CSV source into a columnar file
    Convert {
        /// Path to configuration file
        #[arg(long, default_value = "./cohortscan.json")]
        config: PathBuf,
    },

    /// Run the cohort query over the columnar file
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./cohortscan.json")]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Append execution counters to the report
        #[arg(long)]
        stats: bool,
    },

    /// Convert if the columnar file is missing or stale, then query
    Run {
        /// Path to configuration file
        #[arg(long, default_value = "./cohortscan.json")]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Append execution counters to the report
        #[arg(long)]
        stats: bool,
    },

    /// Print the query plan without touching data files
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./cohortscan.json")]
        config: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print columnar file metadata
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./cohortscan.json")]
        config: PathBuf,
    },

    /// Write a synthetic patient CSV
    Generate {
        /// Number of patient rows
        #[arg(long, default_value_t = 10_000)]
        rows: u64,

        /// Random seed; equal seeds give identical files
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Destination CSV path
        #[arg(long)]
        output: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_defaults() {
        let cli = Cli::try_parse_from(["cohortscan", "query"]).unwrap();
        match cli.command {
            Command::Query { config, format, stats } => {
                assert_eq!(config, PathBuf::from("./cohortscan.json"));
                assert_eq!(format, OutputFormat::Text);
                assert!(!stats);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_json_with_stats() {
        let cli = Cli::try_parse_from([
            "cohortscan", "run", "--config", "c.json", "--format", "json", "--stats",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Run { format: OutputFormat::Json, stats: true, .. }
        ));
    }

    #[test]
    fn test_generate_requires_output() {
        assert!(Cli::try_parse_from(["cohortscan", "generate"]).is_err());
        let cli = Cli::try_parse_from([
            "cohortscan", "generate", "--rows", "5", "--seed", "9", "--output", "p.csv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Generate { rows: 5, seed: 9, .. }));
    }
}
