//! Evaluator: scores a trained model on the shared holdout set
//!
//! The holdout is fed to `predict` in fixed-size chunks so a large holdout
//! never has to be materialized as one prediction vector per call.
//! Chunks are predicted in parallel with rayon (`rayon` feature). Error
//! reductions stay in f64 with compensated summation, so metrics keep full
//! precision for ranking.
//!
//! Toyota Way Principles:
//! - Jidoka: any non-finite prediction or metric stops scoring for the candidate
//! - Heijunka: chunked scoring keeps memory flat

use std::sync::Arc;
use std::time::Duration;

use arrow::record_batch::RecordBatch;
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::data::HoldoutSet;
use crate::error::CandidateError;
use crate::generator::TrainedModel;
use crate::metric::{Metric, MetricKind};
use crate::sandbox::{run_detached, JobFailure};
use crate::Result;

/// Computes the build metric for trained models against one holdout set.
#[derive(Debug, Clone)]
pub struct Evaluator {
    metric: Metric,
    kind: MetricKind,
    holdout: Arc<HoldoutSet>,
    chunk_rows: usize,
}

impl Evaluator {
    /// Create an evaluator for `metric` over `holdout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// metric name is not a built-in metric.
    pub fn new(metric: Metric, holdout: Arc<HoldoutSet>, chunk_rows: usize) -> Result<Self> {
        let kind = metric.kind()?;
        Ok(Self {
            metric,
            kind,
            holdout,
            chunk_rows: chunk_rows.max(1),
        })
    }

    /// Metric being computed.
    #[must_use]
    pub const fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Holdout being scored.
    #[must_use]
    pub fn holdout(&self) -> &HoldoutSet {
        &self.holdout
    }

    /// Score `model` on the holdout.
    ///
    /// # Errors
    ///
    /// Returns [`CandidateError::EvaluationFailed`] if the holdout is empty,
    /// `predict` fails or returns the wrong number of values, or a prediction
    /// or the final metric is not finite.
    pub fn evaluate(&self, model: &dyn TrainedModel) -> std::result::Result<f64, CandidateError> {
        if self.holdout.is_empty() {
            return Err(CandidateError::evaluation("holdout set is empty"));
        }

        let chunks: Vec<(RecordBatch, &[f64])> = self.holdout.chunks(self.chunk_rows).collect();

        #[cfg(feature = "rayon")]
        let predicted: Vec<Vec<f64>> = chunks
            .par_iter()
            .map(|(features, targets)| predict_chunk(model, features, targets.len()))
            .collect::<std::result::Result<_, _>>()?;

        #[cfg(not(feature = "rayon"))]
        let predicted: Vec<Vec<f64>> = chunks
            .iter()
            .map(|(features, targets)| predict_chunk(model, features, targets.len()))
            .collect::<std::result::Result<_, _>>()?;

        let predictions: Vec<f64> = predicted.into_iter().flatten().collect();
        let value = score(self.kind, &predictions, self.holdout.targets())?;
        if !value.is_finite() {
            return Err(CandidateError::evaluation(format!(
                "{} is not finite ({value})",
                self.kind.name()
            )));
        }

        debug!(metric = self.kind.name(), value, rows = predictions.len(), "holdout scored");
        Ok(value)
    }

    /// Score `model` on a detached worker thread within `limit`.
    ///
    /// A panic inside `predict` or a scoring run exceeding `limit` is reported
    /// as [`CandidateError::EvaluationFailed`].
    ///
    /// # Errors
    ///
    /// See [`Evaluator::evaluate`].
    #[instrument(skip_all, fields(metric = self.kind.name(), ?limit))]
    pub async fn evaluate_isolated(
        self: Arc<Self>,
        model: Arc<dyn TrainedModel>,
        limit: Duration,
    ) -> std::result::Result<f64, CandidateError> {
        let job = run_detached("modelsmith-eval".to_string(), limit, move || self.evaluate(model.as_ref()));
        match job.await {
            Ok(result) => result,
            Err(JobFailure::TimedOut) => Err(CandidateError::evaluation(format!(
                "scoring did not finish within {}ms",
                limit.as_millis()
            ))),
            Err(JobFailure::Panicked(message)) => {
                Err(CandidateError::evaluation(format!("predict panicked: {message}")))
            }
            Err(JobFailure::Lost(message)) => Err(CandidateError::evaluation(message)),
        }
    }
}

fn predict_chunk(
    model: &dyn TrainedModel,
    features: &RecordBatch,
    expected: usize,
) -> std::result::Result<Vec<f64>, CandidateError> {
    let predictions = model
        .predict(features)
        .map_err(|e| CandidateError::evaluation(format!("predict failed: {e:#}")))?;
    if predictions.len() != expected {
        return Err(CandidateError::evaluation(format!(
            "predict returned {} values for {expected} rows",
            predictions.len()
        )));
    }
    if let Some(bad) = predictions.iter().find(|p| !p.is_finite()) {
        return Err(CandidateError::evaluation(format!("non-finite prediction: {bad}")));
    }
    Ok(predictions)
}

/// Compute `kind` over aligned prediction/target slices.
///
/// # Errors
///
/// Returns [`CandidateError::EvaluationFailed`] on empty or misaligned input,
/// or when r2 is undefined (constant target).
#[allow(clippy::cast_precision_loss)]
pub fn score(kind: MetricKind, predictions: &[f64], targets: &[f64]) -> std::result::Result<f64, CandidateError> {
    if predictions.len() != targets.len() {
        return Err(CandidateError::evaluation(format!(
            "{} predictions for {} targets",
            predictions.len(),
            targets.len()
        )));
    }
    if targets.is_empty() {
        return Err(CandidateError::evaluation("no rows to score"));
    }
    let n = targets.len() as f64;

    let value = match kind {
        MetricKind::Accuracy => {
            let hits: Vec<f64> = predictions
                .iter()
                .zip(targets)
                .map(|(p, t)| if (p.round() - t.round()).abs() < f64::EPSILON { 1.0 } else { 0.0 })
                .collect();
            reduce_sum(&hits) / n
        }
        MetricKind::Mse | MetricKind::Rmse => {
            let mse = reduce_sum(&squared_errors(predictions, targets)) / n;
            if kind == MetricKind::Rmse {
                mse.sqrt()
            } else {
                mse
            }
        }
        MetricKind::Mae => {
            let abs: Vec<f64> = predictions.iter().zip(targets).map(|(p, t)| (p - t).abs()).collect();
            reduce_sum(&abs) / n
        }
        MetricKind::R2 => {
            let mean = reduce_sum(targets) / n;
            let ss_res = reduce_sum(&squared_errors(predictions, targets));
            let deviations: Vec<f64> = targets.iter().map(|t| (t - mean).powi(2)).collect();
            let ss_tot = reduce_sum(&deviations);
            if ss_tot <= 0.0 {
                return Err(CandidateError::evaluation("r2 is undefined for a constant target"));
            }
            1.0 - ss_res / ss_tot
        }
    };
    Ok(value)
}

fn squared_errors(predictions: &[f64], targets: &[f64]) -> Vec<f64> {
    predictions.iter().zip(targets).map(|(p, t)| (p - t).powi(2)).collect()
}

/// Kahan-Babuska (Neumaier) compensated sum in f64.
fn reduce_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0_f64;
    let mut compensation = 0.0_f64;
    for &value in values {
        let total = sum + value;
        if sum.abs() >= value.abs() {
            compensation += (sum - total) + value;
        } else {
            compensation += (value - total) + sum;
        }
        sum = total;
    }
    sum + compensation
}
