//! Row-oriented CSV to columnar conversion
//!
//! The source is streamed record by record with the `csv` crate; only the
//! writer's current row group is held in memory. Cells that cannot be parsed
//! as their column's type become nulls and are counted, they never abort the
//! conversion. A declared column missing from the source header does.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::time::UNIX_EPOCH;

use csv::ByteRecord;
use serde::Serialize;

use super::errors::{StorageError, StorageResult};
use super::format::SourceFingerprint;
use super::reader::ColumnarReader;
use super::types::{ColumnType, Schema, Value};
use super::writer::{ColumnarMetadata, ColumnarWriter, WriterOptions, DEFAULT_ROW_GROUP_SIZE};

/// Options for [`convert_csv`]
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Columns to keep, with the type each is parsed as
    pub schema: Schema,
    pub row_group_size: usize,
    pub delimiter: u8,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            schema: Schema::patient(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            delimiter: b',',
        }
    }
}

/// Outcome of one conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionStats {
    /// Data records read from the source (header excluded)
    pub rows_read: u64,
    pub rows_written: u64,
    /// Cells stored as null because they were empty or unparsable
    pub null_cells: u64,
    /// Non-empty cells that could not be parsed; a subset of `null_cells`
    pub malformed_cells: u64,
    /// Source columns not in the schema
    pub dropped_columns: Vec<String>,
    pub metadata: ColumnarMetadata,
}

impl SourceFingerprint {
    /// Fingerprints a file from its current length and modification time.
    pub fn of(path: &Path) -> StorageResult<Self> {
        let meta = fs::metadata(path).map_err(|e| {
            StorageError::io_error(format!("Failed to stat source: {}", path.display()), e)
        })?;
        let modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Ok(Self {
            path: path.display().to_string(),
            len: meta.len(),
            modified_ms,
        })
    }
}

/// Returns true if `columnar` exists, is readable, and was converted from
/// the current contents of `source`.
///
/// A missing or unreadable columnar file is stale, not an error.
///
/// # Errors
///
/// Returns `COHORT_STORAGE_IO_ERROR` if the source cannot be inspected.
pub fn is_fresh(source: &Path, columnar: &Path) -> StorageResult<bool> {
    let current = SourceFingerprint::of(source)?;
    if !columnar.exists() {
        return Ok(false);
    }
    let reader = match ColumnarReader::open(columnar) {
        Ok(reader) => reader,
        Err(_) => return Ok(false),
    };
    Ok(reader
        .metadata()
        .source
        .as_ref()
        .map_or(false, |recorded| recorded.matches(&current)))
}

/// Converts a CSV file into a columnar file at `dest`.
///
/// # Errors
///
/// - `COHORT_STORAGE_IO_ERROR` if the source is missing or unreadable
/// - `COHORT_SCHEMA_MISMATCH` if a schema column is absent from the header
/// - `COHORT_SOURCE_INVALID` if the CSV itself cannot be parsed
/// - `COHORT_STORAGE_WRITE_FAILED` if the destination cannot be written
pub fn convert_csv(source: &Path, dest: &Path, options: &ConvertOptions) -> StorageResult<ConversionStats> {
    let fingerprint = SourceFingerprint::of(source)?;
    let file = File::open(source).map_err(|e| {
        let message = if e.kind() == io::ErrorKind::NotFound {
            format!("Source file not found: {}", source.display())
        } else {
            format!("Failed to open source: {}", source.display())
        };
        StorageError::io_error(message, e)
    })?;
    convert_csv_reader(io::BufReader::new(file), dest, options, Some(fingerprint))
}

/// Converts CSV from any reader. `source` is recorded in the file header.
pub fn convert_csv_reader<R: Read>(
    input: R,
    dest: &Path,
    options: &ConvertOptions,
    source: Option<SourceFingerprint>,
) -> StorageResult<ConversionStats> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let mut record = ByteRecord::new();
    let has_header = csv_reader
        .read_byte_record(&mut record)
        .map_err(|e| map_csv_error(e, 0))?;
    if !has_header {
        return Err(StorageError::source_invalid(0, "Source is empty; expected a header row"));
    }

    let header: Vec<String> = record
        .iter()
        .map(|field| String::from_utf8_lossy(field).trim().to_string())
        .collect();

    // Source field position for each schema column
    let positions: Vec<usize> = options
        .schema
        .columns()
        .iter()
        .map(|column| {
            header
                .iter()
                .position(|h| h == &column.name)
                .ok_or_else(|| StorageError::missing_column(&column.name))
        })
        .collect::<StorageResult<_>>()?;

    let dropped_columns: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| !positions.contains(i))
        .map(|(_, name)| name.clone())
        .collect();

    let writer_options = WriterOptions {
        row_group_size: options.row_group_size,
        source,
    };
    let mut writer = ColumnarWriter::create(dest, options.schema.clone(), writer_options)?;

    let column_types: Vec<ColumnType> = options
        .schema
        .columns()
        .iter()
        .map(|c| c.column_type)
        .collect();
    let mut row = vec![Value::Null; positions.len()];
    let mut rows_read = 0u64;
    let mut null_cells = 0u64;
    let mut malformed_cells = 0u64;

    loop {
        record.clear();
        match csv_reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                rows_read += 1;
                for (slot, (&position, &column_type)) in
                    positions.iter().zip(&column_types).enumerate()
                {
                    let raw = record.get(position).unwrap_or(b"");
                    let (value, malformed) = parse_cell(raw, column_type);
                    if value.is_null() {
                        null_cells += 1;
                    }
                    if malformed {
                        malformed_cells += 1;
                    }
                    row[slot] = value;
                }
                writer.append_row(&row)?;
            }
            Err(e) => return Err(map_csv_error(e, rows_read + 1)),
        }
    }

    let rows_written = writer.rows_written();
    let metadata = writer.finish()?;

    Ok(ConversionStats {
        rows_read,
        rows_written,
        null_cells,
        malformed_cells,
        dropped_columns,
        metadata,
    })
}

/// Parses one raw cell. Returns the value and whether a non-empty cell was
/// rejected.
///
/// Numeric cells must be finite. Integer columns also accept integral
/// floats such as `45.0`.
fn parse_cell(raw: &[u8], column_type: ColumnType) -> (Value, bool) {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text.trim(),
        Err(_) => return (Value::Null, true),
    };
    if text.is_empty() {
        return (Value::Null, false);
    }

    let parsed = match column_type {
        ColumnType::Float64 => text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Float),
        ColumnType::Int64 => text.parse::<i64>().ok().map(Value::Int).or_else(|| {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64)
                .map(|v| Value::Int(v as i64))
        }),
        ColumnType::Utf8 => Some(Value::Text(text.to_string())),
    };

    match parsed {
        Some(value) => (value, false),
        None => (Value::Null, true),
    }
}

fn map_csv_error(err: csv::Error, fallback_record: u64) -> StorageError {
    let reason = err.to_string();
    let record = err
        .position()
        .map(|p| p.record())
        .unwrap_or(fallback_record);

    match err.into_kind() {
        csv::ErrorKind::Io(e) => StorageError::read_failed("Failed to read source", e),
        _ => StorageError::source_invalid(record, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn convert_str(csv: &str, dest: &Path) -> StorageResult<ConversionStats> {
        convert_csv_reader(csv.as_bytes(), dest, &ConvertOptions::default(), None)
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(b" 22.5 ", ColumnType::Float64), (Value::Float(22.5), false));
        assert_eq!(parse_cell(b"", ColumnType::Float64), (Value::Null, false));
        assert_eq!(parse_cell(b"n/a", ColumnType::Float64), (Value::Null, true));
        assert_eq!(parse_cell(b"NaN", ColumnType::Float64), (Value::Null, true));
        assert_eq!(parse_cell(b"inf", ColumnType::Float64), (Value::Null, true));
        assert_eq!(parse_cell(b"45", ColumnType::Int64), (Value::Int(45), false));
        assert_eq!(parse_cell(b"45.0", ColumnType::Int64), (Value::Int(45), false));
        assert_eq!(parse_cell(b"45.5", ColumnType::Int64), (Value::Null, true));
        assert_eq!(
            parse_cell(b"Ada", ColumnType::Utf8),
            (Value::Text("Ada".into()), false)
        );
    }

    #[test]
    fn test_convert_counts_cells() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("p.chrt");
        let csv = "Name,Age,Glucose,BMI\n\
                   Ada,41,99.5,22.1\n\
                   Bob,,120,abc\n\
                   Cy,37.0,88,31\n";

        let stats = convert_str(csv, &dest).unwrap();
        assert_eq!(stats.rows_read, 3);
        assert_eq!(stats.rows_written, 3);
        assert_eq!(stats.null_cells, 2);
        assert_eq!(stats.malformed_cells, 1);
        assert_eq!(stats.dropped_columns, vec!["Name".to_string()]);
        assert_eq!(stats.metadata.total_rows, 3);
    }

    #[test]
    fn test_fractional_age_is_kept() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("p.chrt");
        let stats = convert_str("BMI,Glucose,Age\n22.0,100,34.5\n22.0,120,40\n", &dest).unwrap();
        assert_eq!(stats.malformed_cells, 0);

        let reader = ColumnarReader::open(&dest).unwrap();
        let names = vec!["Age".to_string()];
        let batch = reader.scan(&names, 10).unwrap().next().unwrap().unwrap();
        assert_eq!(batch.column("Age").unwrap().numeric(0), Some(34.5));
        assert_eq!(batch.column("Age").unwrap().numeric(1), Some(40.0));
    }

    #[test]
    fn test_schema_order_independent_of_source_order() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("p.chrt");
        convert_str("Age,BMI,Glucose\n50,35.0,130\n", &dest).unwrap();

        let reader = ColumnarReader::open(&dest).unwrap();
        let names = vec!["BMI".to_string(), "Glucose".to_string(), "Age".to_string()];
        let batch = reader.scan(&names, 10).unwrap().next().unwrap().unwrap();
        assert_eq!(batch.column("BMI").unwrap().numeric(0), Some(35.0));
        assert_eq!(batch.column("Glucose").unwrap().numeric(0), Some(130.0));
        assert_eq!(batch.column("Age").unwrap().numeric(0), Some(50.0));
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("p.chrt");
        let err = convert_str("Name,Age,BMI\nAda,41,22\n", &dest).unwrap_err();
        assert!(err.is_schema_mismatch());
        assert!(err.message().contains("Glucose"));
        assert!(!dest.exists());
    }

    #[test]
    fn test_short_rows_become_nulls() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("p.chrt");
        let stats = convert_str("BMI,Glucose,Age\n22.0\n", &dest).unwrap();
        assert_eq!(stats.rows_written, 1);
        assert_eq!(stats.null_cells, 2);
        assert_eq!(stats.malformed_cells, 0);
    }

    #[test]
    fn test_empty_source_rejected() {
        let temp = TempDir::new().unwrap();
        let err = convert_str("", &temp.path().join("p.chrt")).unwrap_err();
        assert_eq!(err.code().code(), "COHORT_SOURCE_INVALID");
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = convert_csv(
            &temp.path().join("absent.csv"),
            &temp.path().join("p.chrt"),
            &ConvertOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code().code(), "COHORT_STORAGE_IO_ERROR");
    }

    #[test]
    fn test_freshness_tracks_source() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("p.csv");
        let dest = temp.path().join("p.chrt");
        fs::write(&source, "BMI,Glucose,Age\n22,90,40\n").unwrap();

        assert!(!is_fresh(&source, &dest).unwrap());
        convert_csv(&source, &dest, &ConvertOptions::default()).unwrap();
        assert!(is_fresh(&source, &dest).unwrap());

        fs::write(&source, "BMI,Glucose,Age\n22,90,40\n31,120,55\n").unwrap();
        assert!(!is_fresh(&source, &dest).unwrap());
    }

    #[test]
    fn test_garbage_columnar_file_is_stale() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("p.csv");
        let dest = temp.path().join("p.chrt");
        fs::write(&source, "BMI,Glucose,Age\n").unwrap();
        fs::write(&dest, b"definitely not columnar").unwrap();
        assert!(!is_fresh(&source, &dest).unwrap());
    }
}
