//! Task schema resolution and the train/holdout split

use std::sync::Arc;

use arrow::array::{Array, Float64Array, UInt64Array};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{project_by_name, ChunkIterator};
use crate::{Error, Result};

/// Input (feature) and output (target) columns of the predictive task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSchema {
    input: SchemaRef,
    output: SchemaRef,
}

impl TaskSchema {
    /// Create a task schema from explicit input and output schemas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either side is empty or a column
    /// appears on both sides.
    pub fn new(input: SchemaRef, output: SchemaRef) -> Result<Self> {
        if input.fields().is_empty() {
            return Err(Error::InvalidConfig("input schema has no columns".to_string()));
        }
        if output.fields().is_empty() {
            return Err(Error::InvalidConfig("output schema has no columns".to_string()));
        }
        if let Some(dup) = output
            .fields()
            .iter()
            .find(|f| input.field_with_name(f.name()).is_ok())
        {
            return Err(Error::InvalidConfig(format!(
                "column '{}' is both an input and an output",
                dup.name()
            )));
        }
        Ok(Self { input, output })
    }

    /// Resolve the task schema against a dataset schema.
    ///
    /// Missing sides are derived from the dataset: the output defaults to the
    /// last dataset column, the input to every column not in the output.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if nothing can be derived, or
    /// [`Error::SchemaMismatch`] if an explicit column is absent from the data.
    pub fn resolve(
        dataset: Option<&SchemaRef>,
        input: Option<SchemaRef>,
        output: Option<SchemaRef>,
    ) -> Result<Self> {
        let Some(dataset) = dataset else {
            return match (input, output) {
                (Some(input), Some(output)) => Self::new(input, output),
                _ => Err(Error::InvalidConfig(
                    "input and output schemas are required when no dataset is supplied".to_string(),
                )),
            };
        };

        let output = match output {
            Some(output) => output,
            None => {
                let last = dataset.fields().last().ok_or_else(|| {
                    Error::InvalidConfig("dataset has no columns".to_string())
                })?;
                Arc::new(Schema::new(vec![last.as_ref().clone()]))
            }
        };
        let input = match input {
            Some(input) => input,
            None => Arc::new(Schema::new(
                dataset
                    .fields()
                    .iter()
                    .filter(|f| output.field_with_name(f.name()).is_err())
                    .map(|f| f.as_ref().clone())
                    .collect::<Vec<_>>(),
            )),
        };

        let task = Self::new(input, output)?;
        for field in task.training_schema().fields() {
            if dataset.field_with_name(field.name()).is_err() {
                return Err(Error::SchemaMismatch(format!(
                    "column '{}' not found in dataset",
                    field.name()
                )));
            }
        }
        Ok(task)
    }

    /// Feature columns.
    #[must_use]
    pub fn input(&self) -> &SchemaRef {
        &self.input
    }

    /// Target columns; the first one is scored.
    #[must_use]
    pub fn output(&self) -> &SchemaRef {
        &self.output
    }

    /// Name of the scored target column.
    #[must_use]
    pub fn target_name(&self) -> &str {
        self.output.field(0).name()
    }

    /// Input columns followed by output columns.
    #[must_use]
    pub fn training_schema(&self) -> SchemaRef {
        let fields: Vec<_> = self
            .input
            .fields()
            .iter()
            .chain(self.output.fields().iter())
            .map(|f| f.as_ref().clone())
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Held-out rows: features for `predict` and the scored target values.
#[derive(Debug, Clone)]
pub struct HoldoutSet {
    features: RecordBatch,
    targets: Vec<f64>,
}

impl HoldoutSet {
    /// Create a holdout set; `targets` must have one value per feature row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Other`] on a length mismatch.
    pub fn new(features: RecordBatch, targets: Vec<f64>) -> Result<Self> {
        if features.num_rows() != targets.len() {
            return Err(Error::Other(format!(
                "holdout has {} feature rows but {} targets",
                features.num_rows(),
                targets.len()
            )));
        }
        Ok(Self { features, targets })
    }

    /// Feature columns (input schema).
    #[must_use]
    pub const fn features(&self) -> &RecordBatch {
        &self.features
    }

    /// Target values, one per row.
    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    /// Number of holdout rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the holdout is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Iterate `(features chunk, targets chunk)` pairs of at most `rows` rows.
    pub fn chunks(&self, rows: usize) -> impl Iterator<Item = (RecordBatch, &[f64])> + '_ {
        ChunkIterator::new(&self.features, rows)
            .map(move |(offset, chunk)| {
                let end = offset + chunk.num_rows();
                (chunk, &self.targets[offset..end])
            })
    }
}

/// Train/holdout partition computed once per build.
///
/// The same split is used for every candidate, so metric values are
/// comparable across nodes.
#[derive(Debug, Clone)]
pub struct HoldoutSplit {
    train: RecordBatch,
    holdout: HoldoutSet,
}

impl HoldoutSplit {
    /// Split `data` (training-schema columns) with a seeded permutation.
    ///
    /// `round(rows * holdout_fraction)` rows go to the holdout; row order is
    /// preserved within each side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaMismatch`] if the target cannot be read as
    /// `Float64` or contains nulls.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn new(data: &RecordBatch, task: &TaskSchema, holdout_fraction: f64, seed: u64) -> Result<Self> {
        let rows = data.num_rows();
        let holdout_rows = ((rows as f64) * holdout_fraction).round() as usize;
        let holdout_rows = holdout_rows.min(rows);

        let mut permutation: Vec<u64> = (0..rows as u64).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        permutation.shuffle(&mut rng);

        let (holdout_idx, train_idx) = permutation.split_at_mut(holdout_rows);
        holdout_idx.sort_unstable();
        train_idx.sort_unstable();

        let train = arrow::compute::take_record_batch(data, &UInt64Array::from(train_idx.to_vec()))?;
        let holdout = arrow::compute::take_record_batch(data, &UInt64Array::from(holdout_idx.to_vec()))?;

        let features = project_by_name(&holdout, task.input())?;
        let targets = target_values(&holdout, task.target_name())?;

        Ok(Self {
            train,
            holdout: HoldoutSet::new(features, targets)?,
        })
    }

    /// Training rows (input and output columns).
    #[must_use]
    pub const fn train(&self) -> &RecordBatch {
        &self.train
    }

    /// Held-out rows.
    #[must_use]
    pub const fn holdout(&self) -> &HoldoutSet {
        &self.holdout
    }
}

fn target_values(batch: &RecordBatch, target: &str) -> Result<Vec<f64>> {
    let column = batch
        .column_by_name(target)
        .ok_or_else(|| Error::SchemaMismatch(format!("target column '{target}' not found")))?;
    let cast = arrow::compute::cast(column, &DataType::Float64).map_err(|e| {
        Error::SchemaMismatch(format!("target column '{target}' is not numeric: {e}"))
    })?;
    let values = cast
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Other("Failed to downcast target column to Float64Array".to_string()))?;
    if values.null_count() > 0 {
        return Err(Error::SchemaMismatch(format!(
            "target column '{target}' contains {} nulls",
            values.null_count()
        )));
    }
    Ok(values.values().to_vec())
}
