//! Report output for the CLI
//!
//! - JSON responses: a single object per command on stdout
//! - Text reports: written verbatim
//! - Logs never go to stdout (see `Logger::route_all_to_stderr`)

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use super::errors::CliResult;

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    write_response_to(&mut stdout, data)
}

pub(crate) fn write_response_to<W: Write>(writer: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    serde_json::to_writer(&mut *writer, &response)?;
    writeln!(writer)?;
    writer.flush()?;

    Ok(())
}

/// Serializes `data` and writes it as a success response
pub fn write_serialized<T: Serialize>(data: &T) -> CliResult<()> {
    write_response(serde_json::to_value(data)?)
}

/// Write a rendered report to stdout
pub fn write_text(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(text.as_bytes())?;
    if !text.ends_with('\n') {
        writeln!(stdout)?;
    }
    stdout.flush()?;

    Ok(())
}
