//! Data source (Arrow/Parquet)
//!
//! The engine only needs a stable train/holdout split and a row count.
//! Rows come from a caller-supplied dataset, a [`DataGenerator`](crate::generator::DataGenerator),
//! or both; everything is normalized to one Arrow schema before splitting.
//!
//! Toyota Way Principles:
//! - Poka-Yoke: Schema is validated on every append, not at scoring time
//! - Heijunka: Holdout is scored in fixed-size chunks

mod split;

pub use split::{HoldoutSet, HoldoutSplit, TaskSchema};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use std::path::Path;

use crate::{Error, Result};

/// Tabular dataset as a sequence of Arrow record batches sharing one schema.
#[derive(Debug, Clone, Default)]
pub struct DataSource {
    batches: Vec<RecordBatch>,
}

impl DataSource {
    /// Create a data source from existing batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the batches disagree on schema.
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let mut source = Self::default();
        for batch in batches {
            source.append_batch(batch)?;
        }
        Ok(source)
    }

    /// Create a data source from a single batch.
    #[must_use]
    pub fn from_batch(batch: RecordBatch) -> Self {
        Self {
            batches: vec![batch],
        }
    }

    /// Load a dataset from a Parquet file.
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut source = Self::default();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            source.append_batch(batch)?;
        }

        Ok(source)
    }

    /// Append a batch; its schema must match the existing batches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] on incompatible schemas.
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            let existing_schema = first.schema();
            if batch.schema() != existing_schema {
                return Err(Error::SchemaMismatch(format!(
                    "expected {:?}, got {:?}",
                    existing_schema,
                    batch.schema()
                )));
            }
        }

        self.batches.push(batch);
        Ok(())
    }

    /// All record batches.
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Schema shared by all batches (`None` when empty).
    #[must_use]
    pub fn schema(&self) -> Option<SchemaRef> {
        self.batches.first().map(RecordBatch::schema)
    }

    /// Total row count.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Whether the source holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Concatenate into a single batch with the given column order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if a column of `schema` is missing
    /// from the source.
    pub fn concat_projected(&self, schema: &SchemaRef) -> Result<RecordBatch> {
        let projected = self
            .batches
            .iter()
            .map(|batch| project_by_name(batch, schema))
            .collect::<Result<Vec<_>>>()?;
        Ok(arrow::compute::concat_batches(schema, projected.iter())?)
    }
}

/// Reorder/select columns of `batch` to match `schema` by field name.
///
/// # Errors
///
/// Returns [`Error::SchemaMismatch`] if a field is missing or has a different type.
pub fn project_by_name(batch: &RecordBatch, schema: &SchemaRef) -> Result<RecordBatch> {
    let source_schema = batch.schema();
    let mut indices = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let index = source_schema.index_of(field.name()).map_err(|_| {
            Error::SchemaMismatch(format!("column '{}' not found in data", field.name()))
        })?;
        let found = source_schema.field(index);
        if found.data_type() != field.data_type() {
            return Err(Error::SchemaMismatch(format!(
                "column '{}' has type {:?}, expected {:?}",
                field.name(),
                found.data_type(),
                field.data_type()
            )));
        }
        indices.push(index);
    }
    let projected = batch.project(&indices)?;
    Ok(RecordBatch::try_new(schema.clone(), projected.columns().to_vec())?)
}

/// Iterator over fixed-size row chunks of a batch.
pub struct ChunkIterator<'a> {
    batch: &'a RecordBatch,
    offset: usize,
    chunk_rows: usize,
}

impl<'a> ChunkIterator<'a> {
    /// Create a chunk iterator; `chunk_rows` of zero is treated as one.
    #[must_use]
    pub fn new(batch: &'a RecordBatch, chunk_rows: usize) -> Self {
        Self {
            batch,
            offset: 0,
            chunk_rows: chunk_rows.max(1),
        }
    }
}

impl Iterator for ChunkIterator<'_> {
    /// `(row offset, chunk)`
    type Item = (usize, RecordBatch);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.batch.num_rows() {
            return None;
        }

        let remaining_rows = self.batch.num_rows() - self.offset;
        let slice_length = remaining_rows.min(self.chunk_rows);
        let start = self.offset;
        self.offset += slice_length;

        Some((start, self.batch.slice(start, slice_length)))
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::linear_batch;
    use super::*;
    use arrow::array::Int32Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_append_batch_schema_validation() {
        let mut source = DataSource::default();
        source.append_batch(linear_batch(10)).unwrap();

        let incompatible_schema = Schema::new(vec![Field::new("other", DataType::Int32, false)]);
        let incompatible_batch = RecordBatch::try_new(
            Arc::new(incompatible_schema),
            vec![Arc::new(Int32Array::from(vec![1, 2, 3]))],
        )
        .unwrap();

        let result = source.append_batch(incompatible_batch);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Schema mismatch"));
        assert_eq!(source.num_rows(), 10);
    }

    #[test]
    fn test_concat_projected_reorders_columns() {
        let source = DataSource::new(vec![linear_batch(5), linear_batch(7)]).unwrap();
        let schema = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Float64, false),
            Field::new("x", DataType::Float64, false),
        ]));

        let batch = source.concat_projected(&schema).unwrap();
        assert_eq!(batch.num_rows(), 12);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.schema().field(0).name(), "y");
    }

    #[test]
    fn test_project_missing_column() {
        let schema = Arc::new(Schema::new(vec![Field::new("z", DataType::Float64, false)]));
        let err = project_by_name(&linear_batch(3), &schema).unwrap_err();
        assert!(err.to_string().contains("column 'z' not found"));
    }

    #[test]
    fn test_project_type_mismatch() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Float64, false)]));
        let err = project_by_name(&linear_batch(3), &schema).unwrap_err();
        assert!(err.to_string().contains("has type"));
    }

    #[test]
    fn test_chunk_iterator_covers_all_rows() {
        let batch = linear_batch(1000);
        let chunks: Vec<_> = ChunkIterator::new(&batch, 128).collect();
        let total: usize = chunks.iter().map(|(_, c)| c.num_rows()).sum();
        assert_eq!(total, 1000);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks[1].0, 128);
    }

    #[test]
    fn test_chunk_iterator_empty_batch() {
        let batch = linear_batch(0);
        assert_eq!(ChunkIterator::new(&batch, 16).count(), 0);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: chunking preserves all rows (no data loss)
            #[test]
            fn prop_chunks_preserve_rows(num_rows in 0usize..5_000, chunk in 1usize..700) {
                let batch = linear_batch(num_rows);
                let total: usize = ChunkIterator::new(&batch, chunk).map(|(_, c)| c.num_rows()).sum();
                prop_assert_eq!(total, num_rows);
            }
        }
    }
}
