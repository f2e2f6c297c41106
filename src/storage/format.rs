//! Columnar file format
//!
//! ```text
//! +---------------------------+
//! | Magic "CHRT"              | 4 bytes
//! | Format version            | u16 LE
//! | Header length             | u32 LE
//! | Header                    | JSON (FileHeader)
//! | Header checksum           | u32 LE, over everything above
//! +---------------------------+
//! | Row group                 |
//! |   row count               | u32 LE
//! |   column count            | u16 LE
//! |   body length             | u32 LE
//! |   group header checksum   | u32 LE
//! |   column chunk * N        | [type u8][payload len u32][payload][crc u32]
//! +---------------------------+
//! | ... more row groups ...   |
//! +---------------------------+
//! | Row group offsets         | u64 LE * group count
//! | Total rows                | u64 LE
//! | Group count               | u32 LE
//! | Footer checksum           | u32 LE, over offsets, total rows, group count
//! | Magic "CHRF"              | 4 bytes
//! +---------------------------+
//! ```
//!
//! A chunk payload is a validity bitmap (one bit per row, set = present)
//! followed by the values. Fixed-width values are little-endian with nulls
//! stored as zero; text values are `[len u32][bytes]` per row. Each chunk
//! carries its own checksum so unprojected chunks can be skipped by seeking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::ColumnData;
use super::checksum::{compute_checksum, compute_checksum_parts, verify_checksum};
use super::errors::{StorageError, StorageResult};
use super::types::{ColumnType, Schema};

/// Leading file magic
pub const MAGIC: &[u8; 4] = b"CHRT";

/// Trailing file magic
pub const FOOTER_MAGIC: &[u8; 4] = b"CHRF";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Magic + version + header length
pub const PREAMBLE_SIZE: usize = 4 + 2 + 4;

/// Row count + column count + body length + checksum
pub const GROUP_HEADER_SIZE: usize = 4 + 2 + 4 + 4;

/// Type tag + payload length
pub const CHUNK_HEADER_SIZE: usize = 1 + 4;

/// Group count + footer checksum + footer magic
pub const TRAILER_SIZE: usize = 4 + 4 + 4;

/// Identity of the row-oriented source a columnar file was converted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    /// Source path as given at conversion time
    pub path: String,
    /// Source length in bytes
    pub len: u64,
    /// Source modification time, milliseconds since the Unix epoch
    pub modified_ms: i64,
}

impl SourceFingerprint {
    /// Returns true if both fingerprints describe the same source contents.
    /// The path is informational and not compared.
    pub fn matches(&self, other: &SourceFingerprint) -> bool {
        self.len == other.len && self.modified_ms == other.modified_ms
    }
}

/// JSON header stored at the start of every columnar file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    pub version: u16,
    pub schema: Schema,
    pub row_group_size: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<SourceFingerprint>,
}

/// Encodes the file preamble: magic, version, header length, header, checksum.
pub fn encode_preamble(header: &FileHeader) -> StorageResult<Vec<u8>> {
    let json = serde_json::to_vec(header).map_err(|e| {
        StorageError::write_failed_no_source(format!("Failed to encode file header: {}", e))
    })?;

    let mut buf = Vec::with_capacity(PREAMBLE_SIZE + json.len() + 4);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(json.len() as u32).to_le_bytes());
    buf.extend_from_slice(&json);

    let checksum = compute_checksum(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

/// Validates the fixed preamble prefix and returns the header length.
pub fn decode_preamble_prefix(prefix: &[u8; PREAMBLE_SIZE]) -> StorageResult<usize> {
    if &prefix[0..4] != MAGIC {
        return Err(StorageError::corruption_at_offset(
            0,
            "Not a columnar file: bad magic",
        ));
    }

    let version = u16::from_le_bytes([prefix[4], prefix[5]]);
    if version != FORMAT_VERSION {
        return Err(StorageError::corruption_at_offset(
            4,
            format!(
                "Unsupported format version {}, expected {}",
                version, FORMAT_VERSION
            ),
        ));
    }

    Ok(u32::from_le_bytes([prefix[6], prefix[7], prefix[8], prefix[9]]) as usize)
}

/// Verifies the header checksum and parses the JSON header.
pub fn decode_header(
    prefix: &[u8; PREAMBLE_SIZE],
    json: &[u8],
    stored_checksum: u32,
) -> StorageResult<FileHeader> {
    let computed = compute_checksum_parts(&[prefix, json]);
    if computed != stored_checksum {
        return Err(StorageError::corruption_at_offset(
            PREAMBLE_SIZE as u64,
            format!(
                "Header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_checksum, computed
            ),
        ));
    }

    serde_json::from_slice(json).map_err(|e| {
        StorageError::corruption_at_offset(
            PREAMBLE_SIZE as u64,
            format!("Invalid file header: {}", e),
        )
    })
}

/// Fixed-size header preceding each row group's column chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupHeader {
    pub row_count: u32,
    pub column_count: u16,
    pub body_len: u32,
}

impl GroupHeader {
    pub fn encode(&self) -> [u8; GROUP_HEADER_SIZE] {
        let mut buf = [0u8; GROUP_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.row_count.to_le_bytes());
        buf[4..6].copy_from_slice(&self.column_count.to_le_bytes());
        buf[6..10].copy_from_slice(&self.body_len.to_le_bytes());
        let checksum = compute_checksum(&buf[0..10]);
        buf[10..14].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8; GROUP_HEADER_SIZE], offset: u64) -> StorageResult<Self> {
        let stored = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
        if !verify_checksum(&buf[0..10], stored) {
            return Err(StorageError::corruption_at_offset(
                offset,
                "Row group header checksum mismatch",
            ));
        }

        Ok(Self {
            row_count: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            column_count: u16::from_le_bytes([buf[4], buf[5]]),
            body_len: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
        })
    }
}

fn bitmap_len(rows: usize) -> usize {
    (rows + 7) / 8
}

/// Encodes one column chunk: type tag, payload length, payload, checksum.
pub fn encode_chunk(column: &ColumnData) -> Vec<u8> {
    let rows = column.len();
    let mut payload = vec![0u8; bitmap_len(rows)];

    match column {
        ColumnData::Float64(values) => {
            payload.reserve(rows * 8);
            for (i, v) in values.iter().enumerate() {
                if v.is_some() {
                    payload[i / 8] |= 1 << (i % 8);
                }
                payload.extend_from_slice(&v.unwrap_or(0.0).to_le_bytes());
            }
        }
        ColumnData::Int64(values) => {
            payload.reserve(rows * 8);
            for (i, v) in values.iter().enumerate() {
                if v.is_some() {
                    payload[i / 8] |= 1 << (i % 8);
                }
                payload.extend_from_slice(&v.unwrap_or(0).to_le_bytes());
            }
        }
        ColumnData::Utf8(values) => {
            for (i, v) in values.iter().enumerate() {
                let bytes = match v {
                    Some(s) => {
                        payload[i / 8] |= 1 << (i % 8);
                        s.as_bytes()
                    }
                    None => &[],
                };
                payload.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                payload.extend_from_slice(bytes);
            }
        }
    }

    let mut buf = Vec::with_capacity(CHUNK_HEADER_SIZE + payload.len() + 4);
    buf.push(column.column_type().tag());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    let checksum = compute_checksum(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// Parses a chunk header into its column type and payload length.
pub fn decode_chunk_header(
    buf: &[u8; CHUNK_HEADER_SIZE],
    offset: u64,
) -> StorageResult<(ColumnType, usize)> {
    let column_type = ColumnType::from_tag(buf[0]).ok_or_else(|| {
        StorageError::corruption_at_offset(offset, format!("Unknown column type tag {}", buf[0]))
    })?;
    let len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
    Ok((column_type, len))
}

/// Verifies a chunk's checksum and decodes its payload into `rows` values.
pub fn decode_chunk(
    header: &[u8; CHUNK_HEADER_SIZE],
    payload: &[u8],
    stored_checksum: u32,
    rows: usize,
    offset: u64,
) -> StorageResult<ColumnData> {
    let computed = compute_checksum_parts(&[header, payload]);
    if computed != stored_checksum {
        return Err(StorageError::corruption_at_offset(
            offset,
            format!(
                "Column chunk checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_checksum, computed
            ),
        ));
    }

    let (column_type, _) = decode_chunk_header(header, offset)?;
    let bitmap_bytes = bitmap_len(rows);
    if payload.len() < bitmap_bytes {
        return Err(StorageError::corruption_at_offset(
            offset,
            "Column chunk shorter than its validity bitmap",
        ));
    }
    let (bitmap, values) = payload.split_at(bitmap_bytes);
    let valid = |i: usize| bitmap[i / 8] & (1 << (i % 8)) != 0;

    match column_type {
        ColumnType::Float64 | ColumnType::Int64 => {
            if values.len() != rows * 8 {
                return Err(StorageError::corruption_at_offset(
                    offset,
                    format!(
                        "Column chunk holds {} value bytes, expected {}",
                        values.len(),
                        rows * 8
                    ),
                ));
            }
            let words = values.chunks_exact(8).map(|w| {
                let mut b = [0u8; 8];
                b.copy_from_slice(w);
                b
            });
            if column_type == ColumnType::Float64 {
                Ok(ColumnData::Float64(
                    words
                        .enumerate()
                        .map(|(i, b)| valid(i).then(|| f64::from_le_bytes(b)))
                        .collect(),
                ))
            } else {
                Ok(ColumnData::Int64(
                    words
                        .enumerate()
                        .map(|(i, b)| valid(i).then(|| i64::from_le_bytes(b)))
                        .collect(),
                ))
            }
        }
        ColumnType::Utf8 => {
            let mut out = Vec::with_capacity(rows);
            let mut pos = 0usize;
            for i in 0..rows {
                if pos + 4 > values.len() {
                    return Err(StorageError::corruption_at_offset(
                        offset,
                        format!("Text chunk truncated at row {}", i),
                    ));
                }
                let len = u32::from_le_bytes([
                    values[pos],
                    values[pos + 1],
                    values[pos + 2],
                    values[pos + 3],
                ]) as usize;
                pos += 4;
                if pos + len > values.len() {
                    return Err(StorageError::corruption_at_offset(
                        offset,
                        format!("Text value at row {} overruns its chunk", i),
                    ));
                }
                let text = std::str::from_utf8(&values[pos..pos + len]).map_err(|e| {
                    StorageError::corruption_at_offset(
                        offset,
                        format!("Invalid UTF-8 at row {}: {}", i, e),
                    )
                })?;
                pos += len;
                out.push(valid(i).then(|| text.to_string()));
            }
            if pos != values.len() {
                return Err(StorageError::corruption_at_offset(
                    offset,
                    "Trailing bytes after last text value",
                ));
            }
            Ok(ColumnData::Utf8(out))
        }
    }
}

/// Row-group directory stored at the end of the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub group_offsets: Vec<u64>,
    pub total_rows: u64,
}

impl Footer {
    /// Encodes offsets, total rows and the fixed trailer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.group_offsets.len() * 8 + 8 + TRAILER_SIZE);
        for offset in &self.group_offsets {
            buf.extend_from_slice(&offset.to_le_bytes());
        }
        buf.extend_from_slice(&self.total_rows.to_le_bytes());
        buf.extend_from_slice(&(self.group_offsets.len() as u32).to_le_bytes());
        let checksum = compute_checksum(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        buf.extend_from_slice(FOOTER_MAGIC);
        buf
    }

    /// Parses the fixed trailer into (group count, footer checksum).
    pub fn decode_trailer(buf: &[u8; TRAILER_SIZE], offset: u64) -> StorageResult<(u32, u32)> {
        if &buf[8..12] != FOOTER_MAGIC {
            return Err(StorageError::corruption_at_offset(
                offset,
                "Missing footer magic; file is truncated or was never finished",
            ));
        }
        let group_count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let checksum = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok((group_count, checksum))
    }

    /// Decodes the directory body (offsets + total rows) after verifying it
    /// against the trailer checksum.
    pub fn decode_body(
        body: &[u8],
        group_count: u32,
        stored_checksum: u32,
        offset: u64,
    ) -> StorageResult<Self> {
        let count_bytes = group_count.to_le_bytes();
        if compute_checksum_parts(&[body, &count_bytes]) != stored_checksum {
            return Err(StorageError::corruption_at_offset(
                offset,
                "Footer checksum mismatch",
            ));
        }
        if body.len() != group_count as usize * 8 + 8 {
            return Err(StorageError::corruption_at_offset(
                offset,
                format!(
                    "Footer holds {} bytes, expected {} for {} row groups",
                    body.len(),
                    group_count as usize * 8 + 8,
                    group_count
                ),
            ));
        }

        let read_u64 = |pos: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&body[pos..pos + 8]);
            u64::from_le_bytes(b)
        };
        let group_offsets = (0..group_count as usize).map(|i| read_u64(i * 8)).collect();
        let total_rows = read_u64(group_count as usize * 8);

        Ok(Self {
            group_offsets,
            total_rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FileHeader {
        FileHeader {
            version: FORMAT_VERSION,
            schema: Schema::patient(),
            row_group_size: 1024,
            created_at: Utc::now(),
            source: Some(SourceFingerprint {
                path: "patients.csv".into(),
                len: 4096,
                modified_ms: 1_700_000_000_000,
            }),
        }
    }

    fn split_chunk(encoded: &[u8]) -> ([u8; CHUNK_HEADER_SIZE], &[u8], u32) {
        let mut header = [0u8; CHUNK_HEADER_SIZE];
        header.copy_from_slice(&encoded[..CHUNK_HEADER_SIZE]);
        let end = encoded.len() - 4;
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&encoded[end..]);
        (header, &encoded[CHUNK_HEADER_SIZE..end], u32::from_le_bytes(crc))
    }

    #[test]
    fn test_preamble_decodes() {
        let header = sample_header();
        let encoded = encode_preamble(&header).unwrap();

        let mut prefix = [0u8; PREAMBLE_SIZE];
        prefix.copy_from_slice(&encoded[..PREAMBLE_SIZE]);
        let len = decode_preamble_prefix(&prefix).unwrap();
        let json = &encoded[PREAMBLE_SIZE..PREAMBLE_SIZE + len];
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&encoded[PREAMBLE_SIZE + len..]);

        let decoded = decode_header(&prefix, json, u32::from_le_bytes(crc)).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut prefix = [0u8; PREAMBLE_SIZE];
        prefix[0..4].copy_from_slice(b"PAR1");
        assert!(decode_preamble_prefix(&prefix).unwrap_err().is_fatal());
    }

    #[test]
    fn test_group_header_checksum() {
        let header = GroupHeader {
            row_count: 10,
            column_count: 3,
            body_len: 512,
        };
        let mut encoded = header.encode();
        assert_eq!(GroupHeader::decode(&encoded, 0).unwrap(), header);

        encoded[0] ^= 0xFF;
        assert!(GroupHeader::decode(&encoded, 0).is_err());
    }

    #[test]
    fn test_chunk_preserves_nulls() {
        let column = ColumnData::Float64(vec![Some(18.5), None, Some(-0.0), None, Some(60.0)]);
        let encoded = encode_chunk(&column);
        let (header, payload, crc) = split_chunk(&encoded);
        assert_eq!(decode_chunk(&header, payload, crc, 5, 0).unwrap(), column);
    }

    #[test]
    fn test_text_chunk_decodes() {
        let column = ColumnData::Utf8(vec![Some("Ada".into()), None, Some(String::new())]);
        let encoded = encode_chunk(&column);
        let (header, payload, crc) = split_chunk(&encoded);
        assert_eq!(decode_chunk(&header, payload, crc, 3, 0).unwrap(), column);
    }

    #[test]
    fn test_chunk_corruption_detected() {
        let column = ColumnData::Int64(vec![Some(41), Some(52)]);
        let mut encoded = encode_chunk(&column);
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0x01;
        let (header, payload, crc) = split_chunk(&encoded);
        let err = decode_chunk(&header, payload, crc, 2, 77).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.details(), Some("byte_offset: 77"));
    }

    #[test]
    fn test_footer_decodes() {
        let footer = Footer {
            group_offsets: vec![120, 4000, 9000],
            total_rows: 2500,
        };
        let encoded = footer.encode();
        let split = encoded.len() - TRAILER_SIZE;

        let mut trailer = [0u8; TRAILER_SIZE];
        trailer.copy_from_slice(&encoded[split..]);
        let (count, crc) = Footer::decode_trailer(&trailer, 0).unwrap();
        assert_eq!(count, 3);

        let decoded = Footer::decode_body(&encoded[..split], count, crc, 0).unwrap();
        assert_eq!(decoded, footer);
    }

    #[test]
    fn test_fingerprint_ignores_path() {
        let a = SourceFingerprint {
            path: "a.csv".into(),
            len: 10,
            modified_ms: 5,
        };
        let b = SourceFingerprint {
            path: "./a.csv".into(),
            ..a.clone()
        };
        assert!(a.matches(&b));
        assert!(!a.matches(&SourceFingerprint { len: 11, ..b }));
    }
}
