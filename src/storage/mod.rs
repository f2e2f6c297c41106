//! Columnar patient store
//!
//! Converts a row-oriented CSV source into a typed, checksummed columnar file
//! and exposes lazy, bounded batch scans over it.
//!
//! # Design Principles
//!
//! - Streamed in both directions: the writer buffers one row group, a scan
//!   holds one decoded row group plus the batch being assembled
//! - Checksums on the header, every row group header, every column chunk
//!   and the footer
//! - Any checksum or structural failure is fatal to the scan
//! - Malformed source cells become nulls and are counted, never fatal

mod batch;
mod checksum;
mod convert;
mod errors;
mod format;
mod reader;
mod types;
mod writer;

pub use batch::{Batch, ColumnData};
pub use checksum::compute_checksum;
pub use convert::{convert_csv, convert_csv_reader, is_fresh, ConversionStats, ConvertOptions};
pub use errors::{Severity, StorageError, StorageErrorCode, StorageResult};
pub use format::{SourceFingerprint, FORMAT_VERSION};
pub use reader::{ColumnarReader, ColumnarScan};
pub use types::{ColumnSchema, ColumnType, Schema, Value};
pub use writer::{ColumnarMetadata, ColumnarWriter, WriterOptions, DEFAULT_ROW_GROUP_SIZE};
