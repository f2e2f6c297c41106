//! CLI module for cohortscan
//!
//! Provides command-line interface for:
//! - convert: CSV source to columnar file
//! - query: cohort report over the columnar file
//! - run: convert when stale, then query
//! - explain: print the plan
//! - inspect: print columnar metadata
//! - generate: write a synthetic source

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command, OutputFormat};
pub use commands::{
    convert, convert_source, execute_query, explain, generate, inspect, query, run, run_command,
    run_pipeline,
};
pub use config::{BmiBounds, Config, COLUMNAR_EXTENSION};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_response, write_serialized, write_text};
