//! External collaborator contracts
//!
//! The engine does not understand natural language or write code. It
//! consumes:
//! - a [`CandidateGenerator`] that turns a [`GenerationRequest`] into a
//!   runnable [`Candidate`] (plan + code + training procedure),
//! - an optional [`DataGenerator`] for synthetic rows.
//!
//! Collaborators report failures as `anyhow::Error`; the engine converts them
//! into candidate-scoped failures recorded on the node.

use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;
use crate::graph::{CandidateSource, Node, NodeId, NodeStatus};
use crate::metric::Metric;
use crate::sandbox::ExecutionContext;

/// A trained predictor produced by a candidate's training procedure.
pub trait TrainedModel: Send + Sync {
    /// Predict one value per row of `features` (input-schema columns only).
    ///
    /// # Errors
    ///
    /// Any error is recorded as an evaluation failure of the candidate.
    fn predict(&self, features: &RecordBatch) -> anyhow::Result<Vec<f64>>;

    /// Serialized model payload, handed to the external packaging routine.
    fn to_bytes(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Feature engineering + training procedure of one candidate.
///
/// Runs on its own worker thread inside the execution sandbox. A timed out
/// run is abandoned, not joined: it no longer holds up the build or runtime
/// shutdown, but its thread keeps burning CPU until `train` returns. Long
/// training loops should poll [`ExecutionContext::is_cancelled`] so that
/// thread exits promptly.
pub trait Trainer: Send + Sync {
    /// Train on `train` (input and output columns) and return a model.
    ///
    /// Files written under [`ExecutionContext::work_dir`] are captured as
    /// artifact files when training succeeds.
    ///
    /// # Errors
    ///
    /// Any error is recorded as an execution fault of the candidate.
    fn train(&self, ctx: &ExecutionContext, train: &RecordBatch) -> anyhow::Result<Box<dyn TrainedModel>>;
}

/// Executable candidate returned by the generator.
#[derive(Clone)]
pub struct Candidate {
    /// Natural-language solution plan.
    pub plan: String,
    /// Generated code (opaque to the engine; kept for feedback and packaging).
    pub code: String,
    /// Training procedure the sandbox executes.
    pub trainer: Arc<dyn Trainer>,
}

impl Candidate {
    /// Create a candidate.
    pub fn new(plan: impl Into<String>, code: impl Into<String>, trainer: Arc<dyn Trainer>) -> Self {
        Self {
            plan: plan.into(),
            code: code.into(),
            trainer,
        }
    }

    pub(crate) fn source(&self) -> CandidateSource {
        CandidateSource {
            plan: self.plan.clone(),
            code: self.code.clone(),
        }
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("plan", &self.plan)
            .field("code", &self.code)
            .finish_non_exhaustive()
    }
}

/// How a prior attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Scored successfully.
    Succeeded {
        /// Holdout metric value.
        metric_value: f64,
    },
    /// Failed at some stage.
    Failed {
        /// Failure kind tag.
        kind: FailureKind,
        /// Failure description.
        message: String,
    },
}

/// Typed summary of a finished attempt, used as generator feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    /// Node the attempt was recorded on.
    pub node: NodeId,
    /// Plan, if generation got that far.
    pub plan: Option<String>,
    /// Code, if generation got that far.
    pub code: Option<String>,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
}

impl AttemptSummary {
    /// Summarize a terminal node; `None` for pending or running nodes.
    #[must_use]
    pub fn from_node(node: &Node) -> Option<Self> {
        let outcome = match node.status() {
            NodeStatus::Succeeded => AttemptOutcome::Succeeded {
                metric_value: node.metric_value()?,
            },
            NodeStatus::Failed => {
                let error = node.error()?;
                AttemptOutcome::Failed {
                    kind: error.kind(),
                    message: error.to_string(),
                }
            }
            NodeStatus::Pending | NodeStatus::Running => return None,
        };
        Some(Self {
            node: node.id(),
            plan: node.source().map(|s| s.plan.clone()),
            code: node.source().map(|s| s.code.clone()),
            outcome,
        })
    }
}

/// Whether the generator starts over or refines an existing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GenerationMode {
    /// Fresh attempt from the intent alone.
    Fresh,
    /// Improve on `parent` (its summary is the first ancestor).
    Refine {
        /// Node being refined.
        parent: NodeId,
    },
}

/// Everything the generator needs to produce the next candidate.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Natural-language description of the desired model.
    pub intent: String,
    /// Feature columns available at prediction time.
    pub input_schema: SchemaRef,
    /// Target column(s); the first field is scored.
    pub output_schema: SchemaRef,
    /// Metric the candidate is judged on.
    pub metric: Metric,
    /// Packages generated code may use.
    pub allowed_packages: Vec<String>,
    /// Fresh attempt or refinement.
    pub mode: GenerationMode,
    /// Ancestors of the new node, nearest first.
    pub ancestors: Vec<AttemptSummary>,
    /// Earlier finished attempts under the same parent, oldest first.
    pub prior_siblings: Vec<AttemptSummary>,
}

impl GenerationRequest {
    /// Summaries of failed ancestors and siblings, for steering away from
    /// repeated faults.
    pub fn prior_failures(&self) -> impl Iterator<Item = &AttemptSummary> {
        self.ancestors
            .iter()
            .chain(&self.prior_siblings)
            .filter(|s| matches!(s.outcome, AttemptOutcome::Failed { .. }))
    }
}

/// Candidate generation provider (LLM-backed or scripted).
#[async_trait]
pub trait CandidateGenerator: Send + Sync {
    /// Produce a candidate for the request.
    ///
    /// # Errors
    ///
    /// Errors are recorded as `GenerationFailed` on the node; the build continues.
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Candidate>;
}

/// Synthetic data provider.
#[async_trait]
pub trait DataGenerator: Send + Sync {
    /// Generate `count` rows with the given schema (input + output columns).
    ///
    /// # Errors
    ///
    /// Any error is build-fatal (`InsufficientData`).
    async fn generate(&self, schema: SchemaRef, count: usize) -> anyhow::Result<RecordBatch>;
}
