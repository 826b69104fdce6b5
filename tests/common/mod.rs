//! Shared fixtures: a scripted candidate generator and a synthetic dataset

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::array::{Array, Float64Array, Int32Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use modelsmith::{
    Candidate, CancellationFlag, CandidateGenerator, DataGenerator, DataSource, ExecutionContext,
    GenerationMode, GenerationRequest, TrainedModel, Trainer,
};

/// `x` (Float64), `id` (Int32), `y = x mod 10` (Float64)
pub fn dataset_batch(rows: usize) -> RecordBatch {
    let xs: Vec<f64> = (0..rows).map(|i| i as f64).collect();
    let ys: Vec<f64> = xs.iter().map(|x| x % 10.0).collect();
    RecordBatch::try_new(
        full_schema(),
        vec![
            Arc::new(Float64Array::from(xs)),
            Arc::new(Int32Array::from_iter_values(0..rows as i32)),
            Arc::new(Float64Array::from(ys)),
        ],
    )
    .unwrap()
}

pub fn dataset(rows: usize) -> DataSource {
    DataSource::from_batch(dataset_batch(rows))
}

pub fn full_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("x", DataType::Float64, false),
        Field::new("id", DataType::Int32, false),
        Field::new("y", DataType::Float64, false),
    ]))
}

pub fn input_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("x", DataType::Float64, false),
        Field::new("id", DataType::Int32, false),
    ]))
}

pub fn output_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("y", DataType::Float64, false)]))
}

/// What the next generated candidate does.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Predicts `y + offset` (mae = |offset|).
    Offset(f64),
    /// Generator returns an error.
    GenerationError,
    /// Training returns an error.
    TrainError,
    /// Training panics.
    TrainPanic,
    /// Training runs until cancelled.
    Hang,
    /// Prediction returns NaN.
    NanPredictions,
    /// Prediction panics.
    PredictPanic,
}

/// Plays back a fixed script; repeats the last step once the script runs out.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    requests: Mutex<Vec<GenerationRequest>>,
    delay: Duration,
    cancel_after: Option<(usize, CancellationFlag)>,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        let script: VecDeque<Step> = steps.into_iter().collect();
        let last = script.back().cloned().unwrap_or(Step::GenerationError);
        Self {
            script: Mutex::new(script),
            last: Mutex::new(last),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            cancel_after: None,
        }
    }

    /// Sleep before answering each request.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancel `flag` once `calls` requests have been answered.
    pub fn cancel_after(mut self, calls: usize, flag: CancellationFlag) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<GenerationMode> {
        self.requests().iter().map(|r| r.mode).collect()
    }

    fn next_step(&self) -> Step {
        let mut script = self.script.lock().unwrap();
        match script.pop_front() {
            Some(step) => step,
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[async_trait]
impl CandidateGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Candidate> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let step = self.next_step();
        let calls = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if let Some((after, flag)) = &self.cancel_after {
            if calls >= *after {
                flag.cancel();
            }
        }

        if step == Step::GenerationError {
            anyhow::bail!("provider returned malformed code");
        }
        let plan = format!("{step:?}");
        let code = format!("// candidate #{calls}: {step:?}");
        Ok(Candidate::new(plan, code, Arc::new(ScriptedTrainer(step))))
    }
}

struct ScriptedTrainer(Step);

impl Trainer for ScriptedTrainer {
    fn train(&self, ctx: &ExecutionContext, _train: &RecordBatch) -> anyhow::Result<Box<dyn TrainedModel>> {
        match &self.0 {
            Step::TrainError => anyhow::bail!("feature pipeline raised ValueError"),
            Step::TrainPanic => panic!("training loop index out of range"),
            Step::Hang => {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                anyhow::bail!("cancelled")
            }
            step => {
                std::fs::write(ctx.work_dir().join("model.txt"), format!("{step:?}"))?;
                Ok(Box::new(ScriptedModel(step.clone())))
            }
        }
    }
}

struct ScriptedModel(Step);

impl TrainedModel for ScriptedModel {
    fn predict(&self, features: &RecordBatch) -> anyhow::Result<Vec<f64>> {
        let x = features
            .column_by_name("x")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| anyhow::anyhow!("column x missing"))?;
        match &self.0 {
            Step::Offset(offset) => Ok(x.values().iter().map(|x| x % 10.0 + offset).collect()),
            Step::NanPredictions => Ok(vec![f64::NAN; x.len()]),
            Step::PredictPanic => panic!("model weights not loaded"),
            other => anyhow::bail!("unexpected step {other:?}"),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{:?}", self.0).into_bytes()
    }
}

/// Produces `dataset_batch(count)`, or fails.
pub struct SyntheticData {
    pub fail: bool,
}

#[async_trait]
impl DataGenerator for SyntheticData {
    async fn generate(&self, schema: SchemaRef, count: usize) -> anyhow::Result<RecordBatch> {
        if self.fail {
            anyhow::bail!("sampler exhausted its retries");
        }
        assert_eq!(schema.fields().len(), 3);
        Ok(dataset_batch(count))
    }
}

/// Produces `dataset_batch(count)` after sleeping for the given duration.
pub struct SlowData(pub Duration);

#[async_trait]
impl DataGenerator for SlowData {
    async fn generate(&self, _schema: SchemaRef, count: usize) -> anyhow::Result<RecordBatch> {
        tokio::time::sleep(self.0).await;
        Ok(dataset_batch(count))
    }
}
