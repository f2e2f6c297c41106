//! Batch sources consumed by the streaming executor

use crate::storage::{Batch, ColumnarScan, Schema, StorageResult, Value};

/// Pull-based supplier of batches in order
///
/// Implementations yield batches lazily and return `Ok(None)` once
/// exhausted. An `Err` ends the sequence.
pub trait BatchSource {
    /// Schema of every batch this source yields
    fn schema(&self) -> &Schema;

    /// Pulls the next batch
    fn next_batch(&mut self) -> StorageResult<Option<Batch>>;
}

impl BatchSource for ColumnarScan {
    fn schema(&self) -> &Schema {
        ColumnarScan::schema(self)
    }

    fn next_batch(&mut self) -> StorageResult<Option<Batch>> {
        self.read_next()
    }
}

/// In-memory batch source over pre-built rows
///
/// Rows are validated against the schema up front, then served in slices of
/// `batch_size`.
#[derive(Debug, Clone)]
pub struct MemorySource {
    schema: Schema,
    batches: std::vec::IntoIter<Batch>,
}

impl MemorySource {
    /// Splits `rows` into batches of at most `batch_size` rows.
    pub fn from_rows(schema: Schema, rows: &[Vec<Value>], batch_size: usize) -> StorageResult<Self> {
        let size = batch_size.max(1);
        let batches = rows
            .chunks(size)
            .map(|chunk| Batch::from_rows(schema.clone(), chunk))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self::from_batches(schema, batches))
    }

    /// Serves already-assembled batches in order.
    pub fn from_batches(schema: Schema, batches: Vec<Batch>) -> Self {
        Self {
            schema,
            batches: batches.into_iter(),
        }
    }
}

impl BatchSource for MemorySource {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn next_batch(&mut self) -> StorageResult<Option<Batch>> {
        Ok(self.batches.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_slices_rows() {
        let rows: Vec<Vec<Value>> = (0..5)
            .map(|i| vec![Value::Float(20.0 + i as f64), Value::Float(100.0), Value::Int(40)])
            .collect();
        let mut source = MemorySource::from_rows(Schema::patient(), &rows, 2).unwrap();

        let sizes: Vec<usize> = std::iter::from_fn(|| source.next_batch().unwrap())
            .map(|b| b.num_rows())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_memory_source_empty() {
        let mut source = MemorySource::from_rows(Schema::patient(), &[], 10).unwrap();
        assert!(source.next_batch().unwrap().is_none());
    }

    #[test]
    fn test_memory_source_rejects_bad_rows() {
        let rows = vec![vec![Value::Text("heavy".into()), Value::Null, Value::Null]];
        assert!(MemorySource::from_rows(Schema::patient(), &rows, 10).is_err());
    }
}
