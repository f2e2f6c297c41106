//! In-memory column vectors and batches
//!
//! A [`Batch`] is the unit of bounded-memory processing: a fixed-maximum
//! number of rows held column-wise, one nullable vector per projected column.

use std::ops::Range;

use super::errors::{StorageError, StorageResult};
use super::types::{ColumnType, Schema, Value};

/// A typed, nullable column vector
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Float64(Vec<Option<f64>>),
    Int64(Vec<Option<i64>>),
    Utf8(Vec<Option<String>>),
}

impl ColumnData {
    /// Creates an empty vector of the given type
    pub fn with_capacity(column_type: ColumnType, capacity: usize) -> Self {
        match column_type {
            ColumnType::Float64 => ColumnData::Float64(Vec::with_capacity(capacity)),
            ColumnType::Int64 => ColumnData::Int64(Vec::with_capacity(capacity)),
            ColumnType::Utf8 => ColumnData::Utf8(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Float64(_) => ColumnType::Float64,
            ColumnData::Int64(_) => ColumnType::Int64,
            ColumnData::Utf8(_) => ColumnType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float64(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match self {
            ColumnData::Float64(v) => v.clear(),
            ColumnData::Int64(v) => v.clear(),
            ColumnData::Utf8(v) => v.clear(),
        }
    }

    /// Appends one value. Integers widen into float columns; anything else
    /// that does not match the column type is a schema mismatch.
    pub fn push(&mut self, value: &Value) -> StorageResult<()> {
        match (self, value) {
            (ColumnData::Float64(v), Value::Null) => v.push(None),
            (ColumnData::Int64(v), Value::Null) => v.push(None),
            (ColumnData::Utf8(v), Value::Null) => v.push(None),
            (ColumnData::Float64(v), Value::Float(x)) => v.push(Some(*x)),
            (ColumnData::Float64(v), Value::Int(x)) => v.push(Some(*x as f64)),
            (ColumnData::Int64(v), Value::Int(x)) => v.push(Some(*x)),
            (ColumnData::Utf8(v), Value::Text(s)) => v.push(Some(s.clone())),
            (column, value) => {
                return Err(StorageError::schema_mismatch(format!(
                    "Cannot store {:?} in a {} column",
                    value,
                    column.column_type()
                )))
            }
        }
        Ok(())
    }

    /// Returns the value at `row` coerced to f64, or None for nulls and text.
    pub fn numeric(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Float64(v) => v.get(row).copied().flatten(),
            ColumnData::Int64(v) => v.get(row).copied().flatten().map(|x| x as f64),
            ColumnData::Utf8(_) => None,
        }
    }

    /// Returns true if the value at `row` is null
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Float64(v) => matches!(v.get(row), Some(None)),
            ColumnData::Int64(v) => matches!(v.get(row), Some(None)),
            ColumnData::Utf8(v) => matches!(v.get(row), Some(None)),
        }
    }

    /// Appends `other[range]` to this vector. Types must match.
    pub fn extend_from(&mut self, other: &ColumnData, range: Range<usize>) -> StorageResult<()> {
        match (self, other) {
            (ColumnData::Float64(dst), ColumnData::Float64(src)) => {
                dst.extend_from_slice(&src[range])
            }
            (ColumnData::Int64(dst), ColumnData::Int64(src)) => dst.extend_from_slice(&src[range]),
            (ColumnData::Utf8(dst), ColumnData::Utf8(src)) => dst.extend_from_slice(&src[range]),
            (dst, src) => {
                return Err(StorageError::schema_mismatch(format!(
                    "Cannot append {} values to a {} column",
                    src.column_type(),
                    dst.column_type()
                )))
            }
        }
        Ok(())
    }
}

/// A bounded, ordered chunk of rows stored column-wise
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    schema: Schema,
    columns: Vec<ColumnData>,
    num_rows: usize,
}

impl Batch {
    /// Creates a batch, checking column count, types and lengths against the schema.
    pub fn new(schema: Schema, columns: Vec<ColumnData>) -> StorageResult<Self> {
        if schema.len() != columns.len() {
            return Err(StorageError::schema_mismatch(format!(
                "Batch has {} columns, schema declares {}",
                columns.len(),
                schema.len()
            )));
        }

        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for (declared, data) in schema.columns().iter().zip(&columns) {
            if declared.column_type != data.column_type() {
                return Err(StorageError::schema_mismatch(format!(
                    "Column '{}' declared {}, got {}",
                    declared.name,
                    declared.column_type,
                    data.column_type()
                )));
            }
            if data.len() != num_rows {
                return Err(StorageError::schema_mismatch(format!(
                    "Column '{}' has {} rows, expected {}",
                    declared.name,
                    data.len(),
                    num_rows
                )));
            }
        }

        Ok(Self {
            schema,
            columns,
            num_rows,
        })
    }

    /// Builds a batch from rows of values. Intended for small in-memory inputs.
    pub fn from_rows(schema: Schema, rows: &[Vec<Value>]) -> StorageResult<Self> {
        let mut columns: Vec<ColumnData> = schema
            .columns()
            .iter()
            .map(|c| ColumnData::with_capacity(c.column_type, rows.len()))
            .collect();

        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(StorageError::schema_mismatch(format!(
                    "Row {} has {} values, schema declares {}",
                    i,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value)?;
            }
        }

        Batch::new(schema, columns)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn columns(&self) -> &[ColumnData] {
        &self.columns
    }

    /// Returns a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.schema.index_of(name).map(|i| &self.columns[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::ColumnSchema;

    fn patient_rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Float(22.5), Value::Float(99.0), Value::Int(41)],
            vec![Value::Null, Value::Float(120.0), Value::Int(37)],
        ]
    }

    #[test]
    fn test_from_rows() {
        let batch = Batch::from_rows(Schema::patient(), &patient_rows()).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.column("BMI").unwrap().numeric(0), Some(22.5));
        assert!(batch.column("BMI").unwrap().is_null(1));
        assert_eq!(batch.column("Age").unwrap().numeric(1), Some(37.0));
    }

    #[test]
    fn test_int_widens_into_float_column() {
        let mut column = ColumnData::with_capacity(ColumnType::Float64, 1);
        column.push(&Value::Int(30)).unwrap();
        assert_eq!(column.numeric(0), Some(30.0));
    }

    #[test]
    fn test_text_into_numeric_column_rejected() {
        let mut column = ColumnData::with_capacity(ColumnType::Int64, 1);
        let err = column.push(&Value::Text("forty".into())).unwrap_err();
        assert!(err.is_schema_mismatch());
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let schema = Schema::new(vec![
            ColumnSchema::new("a", ColumnType::Float64),
            ColumnSchema::new("b", ColumnType::Float64),
        ])
        .unwrap();
        let result = Batch::new(
            schema,
            vec![
                ColumnData::Float64(vec![Some(1.0), Some(2.0)]),
                ColumnData::Float64(vec![Some(1.0)]),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_extend_from_range() {
        let src = ColumnData::Int64(vec![Some(1), None, Some(3), Some(4)]);
        let mut dst = ColumnData::with_capacity(ColumnType::Int64, 2);
        dst.extend_from(&src, 1..3).unwrap();
        assert_eq!(dst, ColumnData::Int64(vec![None, Some(3)]));
    }

    #[test]
    fn test_text_is_not_numeric() {
        let column = ColumnData::Utf8(vec![Some("12".into())]);
        assert_eq!(column.numeric(0), None);
    }
}
