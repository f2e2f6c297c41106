//! Streaming columnar writer
//!
//! Rows are buffered column-wise until a row group is full, then encoded and
//! flushed. At most one row group is held in memory regardless of how many
//! rows are appended.
//!
//! The file is written under a `.tmp` name and renamed into place by
//! [`ColumnarWriter::finish`], so a partially written file is never visible at
//! the destination path.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use super::batch::ColumnData;
use super::errors::{StorageError, StorageResult};
use super::format::{
    encode_chunk, encode_preamble, FileHeader, Footer, GroupHeader, SourceFingerprint,
    FORMAT_VERSION,
};
use super::types::{ColumnType, Schema, Value};

/// Default number of rows per row group
pub const DEFAULT_ROW_GROUP_SIZE: usize = 65_536;

/// Options for [`ColumnarWriter::create`]
#[derive(Debug, Clone)]
pub struct WriterOptions {
    pub row_group_size: usize,
    /// Fingerprint of the source being converted, recorded for freshness checks
    pub source: Option<SourceFingerprint>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
            source: None,
        }
    }
}

/// Description of a finished columnar file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnarMetadata {
    pub path: PathBuf,
    pub version: u16,
    pub schema: Schema,
    pub total_rows: u64,
    pub row_group_count: usize,
    pub row_group_size: usize,
    pub created_at: chrono::DateTime<Utc>,
    pub source: Option<SourceFingerprint>,
}

impl ColumnarMetadata {
    pub(crate) fn from_header(path: &Path, header: &FileHeader, footer: &Footer) -> Self {
        Self {
            path: path.to_path_buf(),
            version: header.version,
            schema: header.schema.clone(),
            total_rows: footer.total_rows,
            row_group_count: footer.group_offsets.len(),
            row_group_size: header.row_group_size,
            created_at: header.created_at,
            source: header.source.clone(),
        }
    }
}

/// Writes a columnar file one row at a time.
pub struct ColumnarWriter {
    /// Final destination
    path: PathBuf,
    /// Path written to until finish
    temp_path: PathBuf,
    file: BufWriter<File>,
    header: FileHeader,
    /// Current row group, column-wise
    buffer: Vec<ColumnData>,
    buffered_rows: usize,
    offset: u64,
    group_offsets: Vec<u64>,
    total_rows: u64,
    finished: bool,
}

impl ColumnarWriter {
    /// Creates a writer for `path`. Parent directories are created if missing.
    ///
    /// # Errors
    ///
    /// Returns `COHORT_STORAGE_WRITE_FAILED` if the file cannot be created or
    /// the header cannot be written.
    pub fn create(path: &Path, schema: Schema, options: WriterOptions) -> StorageResult<Self> {
        if options.row_group_size == 0 || options.row_group_size > u32::MAX as usize {
            return Err(StorageError::write_failed_no_source(format!(
                "Invalid row group size {}",
                options.row_group_size
            )));
        }
        if schema.is_empty() || schema.len() > u16::MAX as usize {
            return Err(StorageError::schema_mismatch(format!(
                "Cannot write a file with {} columns",
                schema.len()
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::write_failed(
                        format!("Failed to create directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let temp_path = temp_path_for(path);
        let file = File::create(&temp_path).map_err(|e| {
            StorageError::write_failed(
                format!("Failed to create columnar file: {}", temp_path.display()),
                e,
            )
        })?;

        let header = FileHeader {
            version: FORMAT_VERSION,
            schema,
            row_group_size: options.row_group_size,
            created_at: Utc::now(),
            source: options.source,
        };

        let mut file = BufWriter::new(file);
        let preamble = encode_preamble(&header)?;
        file.write_all(&preamble).map_err(|e| {
            StorageError::write_failed(
                format!("Failed to write header: {}", temp_path.display()),
                e,
            )
        })?;

        let buffer = header
            .schema
            .columns()
            .iter()
            .map(|c| ColumnData::with_capacity(c.column_type, options.row_group_size))
            .collect();

        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            file,
            header,
            buffer,
            buffered_rows: 0,
            offset: preamble.len() as u64,
            group_offsets: Vec::new(),
            total_rows: 0,
            finished: false,
        })
    }

    /// Returns the destination path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// Number of rows appended so far
    pub fn rows_written(&self) -> u64 {
        self.total_rows + self.buffered_rows as u64
    }

    /// Appends one row. Values are given in schema order.
    ///
    /// # Errors
    ///
    /// Returns `COHORT_SCHEMA_MISMATCH` if the row does not fit the schema; the
    /// row is not written. Flush failures return `COHORT_STORAGE_WRITE_FAILED`.
    pub fn append_row(&mut self, row: &[Value]) -> StorageResult<()> {
        if row.len() != self.buffer.len() {
            return Err(StorageError::schema_mismatch(format!(
                "Row has {} values, schema declares {}",
                row.len(),
                self.buffer.len()
            )));
        }

        // Check every cell before touching the buffer so a bad row leaves no trace
        for (column, value) in self.header.schema.columns().iter().zip(row) {
            let fits = matches!(
                (column.column_type, value),
                (_, Value::Null)
                    | (ColumnType::Float64, Value::Float(_) | Value::Int(_))
                    | (ColumnType::Int64, Value::Int(_))
                    | (ColumnType::Utf8, Value::Text(_))
            );
            if !fits {
                return Err(StorageError::schema_mismatch(format!(
                    "Value {:?} does not fit column '{}' of type {}",
                    value, column.name, column.column_type
                )));
            }
        }

        for (column, value) in self.buffer.iter_mut().zip(row) {
            column.push(value)?;
        }
        self.buffered_rows += 1;

        if self.buffered_rows >= self.header.row_group_size {
            self.flush_group()?;
        }
        Ok(())
    }

    fn flush_group(&mut self) -> StorageResult<()> {
        if self.buffered_rows == 0 {
            return Ok(());
        }

        let chunks: Vec<Vec<u8>> = self.buffer.iter().map(encode_chunk).collect();
        let body_len: usize = chunks.iter().map(|c| c.len()).sum();
        if body_len > u32::MAX as usize {
            return Err(StorageError::write_failed_no_source(format!(
                "Row group of {} bytes exceeds the format limit; lower row_group_size",
                body_len
            )));
        }

        let header = GroupHeader {
            row_count: self.buffered_rows as u32,
            column_count: self.buffer.len() as u16,
            body_len: body_len as u32,
        };

        let group_offset = self.offset;
        self.write_bytes(&header.encode())?;
        for chunk in &chunks {
            self.write_bytes(chunk)?;
        }

        self.group_offsets.push(group_offset);
        self.total_rows += self.buffered_rows as u64;
        self.buffered_rows = 0;
        for column in &mut self.buffer {
            column.clear();
        }
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.file.write_all(bytes).map_err(|e| {
            StorageError::write_failed(
                format!(
                    "Failed to write at offset {} in {}",
                    self.offset,
                    self.temp_path.display()
                ),
                e,
            )
        })?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    /// Flushes the last row group, writes the footer, syncs and renames the
    /// file into place.
    pub fn finish(mut self) -> StorageResult<ColumnarMetadata> {
        self.flush_group()?;

        let footer = Footer {
            group_offsets: std::mem::take(&mut self.group_offsets),
            total_rows: self.total_rows,
        };
        self.write_bytes(&footer.encode())?;

        self.file.flush().map_err(|e| {
            StorageError::write_failed(format!("Failed to flush {}", self.temp_path.display()), e)
        })?;
        self.file.get_ref().sync_all().map_err(|e| {
            StorageError::write_failed(
                format!("fsync failed for {}", self.temp_path.display()),
                e,
            )
        })?;

        fs::rename(&self.temp_path, &self.path).map_err(|e| {
            StorageError::write_failed(
                format!(
                    "Failed to move {} to {}",
                    self.temp_path.display(),
                    self.path.display()
                ),
                e,
            )
        })?;
        self.finished = true;

        Ok(ColumnarMetadata::from_header(&self.path, &self.header, &footer))
    }
}

impl Drop for ColumnarWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "columnar".to_string());
    path.with_file_name(format!("{}.tmp", name))
}
