//! Error types for modelsmith
//!
//! Two layers:
//! - [`Error`]: build-fatal conditions (missing data, bad configuration,
//!   solution-graph contract violations). These escape `build`.
//! - [`CandidateError`]: candidate-scoped failures recorded on a node. These
//!   never abort a build; they feed back into later generation requests.
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{NodeId, NodeStatus};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Build-fatal error types
#[derive(Error, Debug)]
pub enum Error {
    /// No dataset and no sample-generation request (or neither yielded rows)
    #[error("Insufficient data: {0}\nSupply a dataset, a sample-generation request, or both")]
    InsufficientData(String),

    /// Node status transition outside `pending -> running -> {succeeded|failed}`
    #[error("Invalid transition for node {node}: {from} -> {to}\nThis is an orchestrator bug. Please report this issue.")]
    InvalidTransition {
        /// Offending node
        node: NodeId,
        /// Status the node was in
        from: NodeStatus,
        /// Status that was requested
        to: NodeStatus,
    },

    /// Node id not present in the solution graph
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Configuration rejected before the search loop started
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data source schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Storage error (Parquet/Arrow loading)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Discriminant of a [`CandidateError`], used in attempt summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Generator could not produce a candidate
    GenerationFailed,
    /// Training raised an error or panicked
    ExecutionFault,
    /// Training exceeded the per-candidate timeout
    ExecutionTimeout,
    /// Trained model could not be scored on the holdout
    EvaluationFailed,
}

impl FailureKind {
    /// Stable snake-case name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GenerationFailed => "generation_failed",
            Self::ExecutionFault => "execution_fault",
            Self::ExecutionTimeout => "execution_timeout",
            Self::EvaluationFailed => "evaluation_failed",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate-scoped failure, stored on a failed node.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateError {
    /// Generator returned an error instead of a candidate
    #[error("Candidate generation failed: {message}")]
    GenerationFailed {
        /// Generator error chain
        message: String,
    },

    /// Training returned an error or panicked
    #[error("Candidate execution fault: {message}")]
    ExecutionFault {
        /// Fault description
        message: String,
    },

    /// Training did not finish within the per-candidate limit
    #[error("Candidate execution timed out after {limit_ms}ms")]
    ExecutionTimeout {
        /// Limit that was exceeded, in milliseconds
        limit_ms: u64,
    },

    /// Holdout scoring failed (empty holdout, non-finite values, predict error)
    #[error("Candidate evaluation failed: {message}")]
    EvaluationFailed {
        /// Failure description
        message: String,
    },
}

impl CandidateError {
    /// Generation failure from any displayable error.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
        }
    }

    /// Execution fault from any displayable error.
    pub fn fault(message: impl Into<String>) -> Self {
        Self::ExecutionFault {
            message: message.into(),
        }
    }

    /// Timeout of a run limited to `limit`.
    #[must_use]
    pub fn timeout(limit: std::time::Duration) -> Self {
        Self::ExecutionTimeout {
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Evaluation failure from any displayable error.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::EvaluationFailed {
            message: message.into(),
        }
    }

    /// Failure kind tag
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::GenerationFailed { .. } => FailureKind::GenerationFailed,
            Self::ExecutionFault { .. } => FailureKind::ExecutionFault,
            Self::ExecutionTimeout { .. } => FailureKind::ExecutionTimeout,
            Self::EvaluationFailed { .. } => FailureKind::EvaluationFailed,
        }
    }
}
