//! Columnar reader with lazy, bounded batch scans
//!
//! Opening a file validates the preamble, header checksum and footer. Row
//! groups are only read when a scan reaches them; every chunk checksum is
//! verified on read and any mismatch is fatal to the scan.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::batch::{Batch, ColumnData};
use super::errors::{StorageError, StorageResult};
use super::format::{
    decode_chunk, decode_chunk_header, decode_header, decode_preamble_prefix, Footer,
    GroupHeader, CHUNK_HEADER_SIZE, GROUP_HEADER_SIZE, PREAMBLE_SIZE, TRAILER_SIZE,
};
use super::types::{ColumnType, Schema};
use super::writer::ColumnarMetadata;

/// An opened, validated columnar file
#[derive(Debug)]
pub struct ColumnarReader {
    path: PathBuf,
    metadata: ColumnarMetadata,
    group_offsets: Vec<u64>,
    /// First byte after the header checksum
    data_start: u64,
    /// First byte of the footer
    data_end: u64,
}

impl ColumnarReader {
    /// Opens and validates a columnar file.
    ///
    /// # Errors
    ///
    /// - `COHORT_STORAGE_IO_ERROR` if the file is missing or unreadable
    /// - `COHORT_DATA_CORRUPTION` if magic, header, or footer are damaged
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut file = open_file(path)?;
        let file_size = file
            .metadata()
            .map_err(|e| StorageError::io_error("Failed to read file metadata", e))?
            .len();

        let min_size = (PREAMBLE_SIZE + 4 + 8 + TRAILER_SIZE) as u64;
        if file_size < min_size {
            return Err(StorageError::corruption_at_offset(
                0,
                format!(
                    "File is {} bytes, smaller than the minimum of {}",
                    file_size, min_size
                ),
            ));
        }

        // Preamble and header
        let mut prefix = [0u8; PREAMBLE_SIZE];
        read_exact_at(&mut file, 0, &mut prefix)?;
        let header_len = decode_preamble_prefix(&prefix)?;
        let data_start = (PREAMBLE_SIZE + header_len + 4) as u64;
        if data_start + (8 + TRAILER_SIZE) as u64 > file_size {
            return Err(StorageError::corruption_at_offset(
                PREAMBLE_SIZE as u64,
                format!("Header length {} overruns the file", header_len),
            ));
        }
        let mut json = vec![0u8; header_len];
        read_exact_at(&mut file, PREAMBLE_SIZE as u64, &mut json)?;
        let mut crc = [0u8; 4];
        read_exact_at(&mut file, (PREAMBLE_SIZE + header_len) as u64, &mut crc)?;
        let header = decode_header(&prefix, &json, u32::from_le_bytes(crc))?;

        // Footer, read from the fixed trailer backwards
        let trailer_offset = file_size - TRAILER_SIZE as u64;
        let mut trailer = [0u8; TRAILER_SIZE];
        read_exact_at(&mut file, trailer_offset, &mut trailer)?;
        let (group_count, footer_crc) = Footer::decode_trailer(&trailer, trailer_offset)?;

        let body_len = group_count as u64 * 8 + 8;
        if body_len > trailer_offset - data_start {
            return Err(StorageError::corruption_at_offset(
                trailer_offset,
                format!("Footer claims {} row groups, file is too short", group_count),
            ));
        }
        let data_end = trailer_offset - body_len;
        let mut body = vec![0u8; body_len as usize];
        read_exact_at(&mut file, data_end, &mut body)?;
        let footer = Footer::decode_body(&body, group_count, footer_crc, data_end)?;

        let mut previous = None;
        for &offset in &footer.group_offsets {
            let in_range = offset >= data_start && offset + GROUP_HEADER_SIZE as u64 <= data_end;
            let increasing = previous.map_or(true, |p| offset > p);
            if !in_range || !increasing {
                return Err(StorageError::corruption_at_offset(
                    data_end,
                    format!("Footer lists invalid row group offset {}", offset),
                ));
            }
            previous = Some(offset);
        }

        let metadata = ColumnarMetadata::from_header(path, &header, &footer);
        Ok(Self {
            path: path.to_path_buf(),
            metadata,
            group_offsets: footer.group_offsets,
            data_start,
            data_end,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &ColumnarMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &Schema {
        &self.metadata.schema
    }

    /// Returns the byte range holding row groups.
    pub fn data_range(&self) -> (u64, u64) {
        (self.data_start, self.data_end)
    }

    /// Checks that every named column exists with one of its accepted types.
    ///
    /// Returns the file positions of the columns in request order.
    pub fn require_columns(&self, required: &[(&str, &[ColumnType])]) -> StorageResult<Vec<usize>> {
        required
            .iter()
            .map(|(name, accepted)| self.schema().require(name, accepted))
            .collect()
    }

    /// Starts a lazy scan over the projected columns.
    ///
    /// Each call opens an independent file handle; scans do not share state.
    pub fn scan(&self, projection: &[String], batch_size: usize) -> StorageResult<ColumnarScan> {
        if batch_size == 0 {
            return Err(StorageError::schema_mismatch("Batch size must be positive"));
        }
        let (projected_schema, indices) = self.schema().project(projection)?;
        let file = open_file(&self.path)?;

        Ok(ColumnarScan {
            file: BufReader::new(file),
            file_schema: self.schema().clone(),
            projected_schema,
            indices,
            group_offsets: self.group_offsets.clone(),
            data_end: self.data_end,
            next_group: 0,
            current: None,
            batch_size,
            batches_emitted: 0,
            rows_emitted: 0,
            done: false,
        })
    }
}

fn open_file(path: &Path) -> StorageResult<File> {
    File::open(path).map_err(|e| {
        let message = if e.kind() == io::ErrorKind::NotFound {
            format!("Columnar file not found: {}", path.display())
        } else {
            format!("Failed to open columnar file: {}", path.display())
        };
        StorageError::io_error(message, e)
    })
}

fn read_exact_at<R: Read + Seek>(file: &mut R, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| StorageError::read_failed(format!("Failed to seek to offset {}", offset), e))?;
    file.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            StorageError::corruption_at_offset(offset, "Unexpected end of file")
        } else {
            StorageError::read_failed(format!("Failed to read at offset {}", offset), e)
        }
    })
}

/// One decoded row group, projected
#[derive(Debug)]
struct DecodedGroup {
    columns: Vec<ColumnData>,
    rows: usize,
    cursor: usize,
}

impl DecodedGroup {
    fn remaining(&self) -> usize {
        self.rows - self.cursor
    }
}

/// Lazy, finite, non-restartable sequence of batches in file order.
///
/// Holds at most one decoded row group plus the batch being assembled. Peak
/// memory therefore follows `max(row_group_size, batch_size)` projected rows,
/// fixed when the file was written and independent of its total length; a
/// small `batch_size` does not shrink the decoded group. After an error or
/// end of data every further call yields `None`.
#[derive(Debug)]
pub struct ColumnarScan {
    file: BufReader<File>,
    file_schema: Schema,
    projected_schema: Schema,
    /// File column position for each projected column
    indices: Vec<usize>,
    group_offsets: Vec<u64>,
    data_end: u64,
    next_group: usize,
    current: Option<DecodedGroup>,
    batch_size: usize,
    batches_emitted: u64,
    rows_emitted: u64,
    done: bool,
}

impl ColumnarScan {
    /// Schema of the batches this scan yields
    pub fn schema(&self) -> &Schema {
        &self.projected_schema
    }

    pub fn batches_emitted(&self) -> u64 {
        self.batches_emitted
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Rows of the row group currently held in memory, consumed or not
    pub fn decoded_rows(&self) -> usize {
        self.current.as_ref().map_or(0, |g| g.rows)
    }

    /// Reads the next batch, or `Ok(None)` when the file is exhausted.
    pub fn read_next(&mut self) -> StorageResult<Option<Batch>> {
        if self.done {
            return Ok(None);
        }
        match self.assemble_batch() {
            Ok(Some(batch)) => {
                self.batches_emitted += 1;
                self.rows_emitted += batch.num_rows() as u64;
                Ok(Some(batch))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                self.current = None;
                Err(e)
            }
        }
    }

    fn assemble_batch(&mut self) -> StorageResult<Option<Batch>> {
        let mut columns: Vec<ColumnData> = self
            .projected_schema
            .columns()
            .iter()
            .map(|c| ColumnData::with_capacity(c.column_type, self.batch_size))
            .collect();
        let mut filled = 0usize;

        while filled < self.batch_size {
            let exhausted = self.current.as_ref().map_or(true, |g| g.remaining() == 0);
            if exhausted {
                self.current = None;
                if self.next_group >= self.group_offsets.len() {
                    break;
                }
                let group = self.load_group(self.next_group)?;
                self.next_group += 1;
                self.current = Some(group);
                continue;
            }

            if let Some(group) = self.current.as_mut() {
                let take = (self.batch_size - filled).min(group.remaining());
                let range = group.cursor..group.cursor + take;
                for (dst, src) in columns.iter_mut().zip(&group.columns) {
                    dst.extend_from(src, range.clone())?;
                }
                group.cursor += take;
                filled += take;
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        Batch::new(self.projected_schema.clone(), columns).map(Some)
    }

    fn load_group(&mut self, index: usize) -> StorageResult<DecodedGroup> {
        let offset = self.group_offsets[index];
        let limit = self
            .group_offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.data_end);

        let mut raw = [0u8; GROUP_HEADER_SIZE];
        read_exact_at(&mut self.file, offset, &mut raw)?;
        let header = GroupHeader::decode(&raw, offset)?;

        if header.column_count as usize != self.file_schema.len() {
            return Err(StorageError::corruption_at_offset(
                offset,
                format!(
                    "Row group has {} columns, file schema declares {}",
                    header.column_count,
                    self.file_schema.len()
                ),
            ));
        }
        let body_start = offset + GROUP_HEADER_SIZE as u64;
        let body_end = body_start + header.body_len as u64;
        if body_end > limit {
            return Err(StorageError::corruption_at_offset(
                offset,
                format!(
                    "Row group body of {} bytes overruns the next boundary at {}",
                    header.body_len, limit
                ),
            ));
        }

        let rows = header.row_count as usize;
        let mut decoded: Vec<Option<ColumnData>> = vec![None; self.indices.len()];
        let mut position = body_start;

        for (column_index, declared) in self.file_schema.columns().iter().enumerate() {
            let mut chunk_header = [0u8; CHUNK_HEADER_SIZE];
            read_exact_at(&mut self.file, position, &mut chunk_header)?;
            let (column_type, payload_len) = decode_chunk_header(&chunk_header, position)?;
            if column_type != declared.column_type {
                return Err(StorageError::corruption_at_offset(
                    position,
                    format!(
                        "Chunk for '{}' is {}, file schema declares {}",
                        declared.name, column_type, declared.column_type
                    ),
                ));
            }

            let chunk_end = position + (CHUNK_HEADER_SIZE + payload_len + 4) as u64;
            if chunk_end > body_end {
                return Err(StorageError::corruption_at_offset(
                    position,
                    format!("Chunk for '{}' overruns its row group", declared.name),
                ));
            }

            let wanted: Vec<usize> = self
                .indices
                .iter()
                .enumerate()
                .filter(|(_, &file_index)| file_index == column_index)
                .map(|(slot, _)| slot)
                .collect();

            if !wanted.is_empty() {
                let mut payload = vec![0u8; payload_len];
                self.file.read_exact(&mut payload).map_err(|e| {
                    StorageError::corruption_at_offset(
                        position,
                        format!("Failed to read chunk for '{}': {}", declared.name, e),
                    )
                })?;
                let mut crc = [0u8; 4];
                self.file.read_exact(&mut crc).map_err(|e| {
                    StorageError::corruption_at_offset(
                        position,
                        format!("Failed to read chunk checksum: {}", e),
                    )
                })?;
                let column = decode_chunk(
                    &chunk_header,
                    &payload,
                    u32::from_le_bytes(crc),
                    rows,
                    position,
                )?;
                for slot in wanted {
                    decoded[slot] = Some(column.clone());
                }
            }

            position = chunk_end;
        }

        if position != body_end {
            return Err(StorageError::corruption_at_offset(
                offset,
                format!(
                    "Row group body is {} bytes, chunks cover {}",
                    header.body_len,
                    position - body_start
                ),
            ));
        }

        let columns = decoded
            .into_iter()
            .map(|c| c.ok_or_else(|| StorageError::data_corruption("Projected column not decoded")))
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(DecodedGroup {
            columns,
            rows,
            cursor: 0,
        })
    }
}

impl Iterator for ColumnarScan {
    type Item = StorageResult<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Value;
    use crate::storage::writer::{ColumnarWriter, WriterOptions};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_patients(path: &Path, rows: usize, row_group_size: usize) -> ColumnarMetadata {
        let options = WriterOptions {
            row_group_size,
            source: None,
        };
        let mut writer = ColumnarWriter::create(path, Schema::patient(), options).unwrap();
        for i in 0..rows {
            let bmi = if i % 7 == 0 {
                Value::Null
            } else {
                Value::Float(15.0 + i as f64)
            };
            writer
                .append_row(&[bmi, Value::Float(80.0 + i as f64), Value::Int(20 + i as i64)])
                .unwrap();
        }
        writer.finish().unwrap()
    }

    fn all_columns() -> Vec<String> {
        vec!["BMI".into(), "Glucose".into(), "Age".into()]
    }

    #[test]
    fn test_open_reports_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 25, 10);

        let reader = ColumnarReader::open(&path).unwrap();
        assert_eq!(reader.metadata().total_rows, 25);
        assert_eq!(reader.metadata().row_group_count, 3);
        assert_eq!(reader.schema(), &Schema::patient());
    }

    #[test]
    fn test_batches_cross_row_groups() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 25, 10);

        let reader = ColumnarReader::open(&path).unwrap();
        let sizes: Vec<usize> = reader
            .scan(&all_columns(), 7)
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .collect();
        assert_eq!(sizes, vec![7, 7, 7, 4]);
    }

    #[test]
    fn test_resident_rows_follow_row_group_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 25, 10);

        let reader = ColumnarReader::open(&path).unwrap();
        let mut scan = reader.scan(&all_columns(), 1).unwrap();
        let mut peak = 0;
        while let Some(batch) = scan.next() {
            assert_eq!(batch.unwrap().num_rows(), 1);
            peak = peak.max(scan.decoded_rows());
        }
        // A one-row batch still decodes a whole group, never more
        assert_eq!(peak, 10);
        assert_eq!(scan.rows_emitted(), 25);
        assert_eq!(scan.decoded_rows(), 0);
    }

    #[test]
    fn test_scan_preserves_order_and_nulls() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 15, 4);

        let reader = ColumnarReader::open(&path).unwrap();
        let mut ages = Vec::new();
        let mut null_bmis = 0;
        for batch in reader.scan(&all_columns(), 3).unwrap() {
            let batch = batch.unwrap();
            for row in 0..batch.num_rows() {
                ages.push(batch.column("Age").unwrap().numeric(row).unwrap() as i64);
                if batch.column("BMI").unwrap().is_null(row) {
                    null_bmis += 1;
                }
            }
        }
        assert_eq!(ages, (20..35).collect::<Vec<i64>>());
        assert_eq!(null_bmis, 3); // rows 0, 7, 14
    }

    #[test]
    fn test_projection_skips_columns() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 12, 5);

        let reader = ColumnarReader::open(&path).unwrap();
        let mut scan = reader.scan(&["Age".to_string()], 100).unwrap();
        let batch = scan.next().unwrap().unwrap();
        assert_eq!(batch.schema().len(), 1);
        assert_eq!(batch.num_rows(), 12);
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_projection_of_unknown_column_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 3, 5);

        let reader = ColumnarReader::open(&path).unwrap();
        let err = reader.scan(&["Insulin".to_string()], 10).unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_empty_file_scans_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 0, 5);

        let reader = ColumnarReader::open(&path).unwrap();
        assert_eq!(reader.scan(&all_columns(), 10).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = ColumnarReader::open(&temp.path().join("absent.chrt")).unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.code().code(), "COHORT_STORAGE_IO_ERROR");
    }

    #[test]
    fn test_truncated_file_rejected_on_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 20, 5);

        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 6).unwrap();

        assert!(ColumnarReader::open(&path).unwrap_err().is_fatal());
    }

    #[test]
    fn test_corrupt_row_group_fails_scan() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("p.chrt");
        write_patients(&path, 20, 5);

        let reader = ColumnarReader::open(&path).unwrap();
        let (_, data_end) = reader.data_range();

        // Flip a byte inside the last row group's chunks
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(data_end - 10)).unwrap();
        file.write_all(&[0xAB]).unwrap();
        drop(file);

        let mut scan = reader.scan(&all_columns(), 5).unwrap();
        for _ in 0..3 {
            assert!(scan.next().unwrap().is_ok());
        }
        let err = scan.next().unwrap().unwrap_err();
        assert!(err.is_fatal());
        assert!(scan.next().is_none());
    }
}
