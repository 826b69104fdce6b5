//! Node - one candidate implementation attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Artifact, CandidateSource};
use crate::error::CandidateError;
use crate::{Error, Result};

/// Arena index of a node inside one solution graph.
///
/// Ids are assigned in creation order, so comparing ids compares creation
/// time. This is the tie-break used by the selector and the search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// Raw arena index.
    #[must_use]
    pub const fn index(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Status of a node.
///
/// Monotonic: `Pending -> Running -> {Succeeded | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Node is created but not yet dispatched.
    Pending,
    /// Candidate is being generated, executed or evaluated.
    Running,
    /// Candidate executed and scored.
    Succeeded,
    /// Candidate failed at some stage.
    Failed,
}

impl NodeStatus {
    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running) | (Self::Running, Self::Succeeded | Self::Failed)
        )
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        })
    }
}

/// A candidate attempt in the solution graph.
///
/// `metric_value` is present if and only if the status is `Succeeded`;
/// `error` is present if and only if the status is `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    depth: u32,
    status: NodeStatus,
    source: Option<CandidateSource>,
    artifact: Option<Artifact>,
    metric_value: Option<f64>,
    error: Option<CandidateError>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            id,
            parent,
            depth,
            status: NodeStatus::Pending,
            source: None,
            artifact: None,
            metric_value: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Get the node id.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// Get the parent node id (`None` for fresh attempts from the root).
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root (fresh attempts have depth 1).
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> NodeStatus {
        self.status
    }

    /// Plan and code returned by the generator, if generation succeeded.
    #[must_use]
    pub const fn source(&self) -> Option<&CandidateSource> {
        self.source.as_ref()
    }

    /// Executed artifact (succeeded nodes only).
    #[must_use]
    pub const fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Metric value (succeeded nodes only).
    #[must_use]
    pub const fn metric_value(&self) -> Option<f64> {
        self.metric_value
    }

    /// Failure description (failed nodes only).
    #[must_use]
    pub const fn error(&self) -> Option<&CandidateError> {
        self.error.as_ref()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Timestamp of the transition to `Running`.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Timestamp of the terminal transition.
    #[must_use]
    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    fn transition(&mut self, next: NodeStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                node: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub(crate) fn start(&mut self) -> Result<()> {
        self.transition(NodeStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn attach_source(&mut self, source: CandidateSource) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::InvalidTransition {
                node: self.id,
                from: self.status,
                to: self.status,
            });
        }
        self.source = Some(source);
        Ok(())
    }

    pub(crate) fn succeed(&mut self, artifact: Artifact, metric_value: f64) -> Result<()> {
        self.transition(NodeStatus::Succeeded)?;
        self.artifact = Some(artifact);
        self.metric_value = Some(metric_value);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub(crate) fn fail(&mut self, error: CandidateError) -> Result<()> {
        self.transition(NodeStatus::Failed)?;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_default() {
        let node = Node::new(NodeId(0), None, 1);
        assert_eq!(node.status(), NodeStatus::Pending);
        assert!(node.started_at().is_none());
        assert!(node.metric_value().is_none());
    }

    #[test]
    fn test_node_lifecycle_failed() {
        let mut node = Node::new(NodeId(3), Some(NodeId(1)), 2);
        node.start().unwrap();
        assert_eq!(node.status(), NodeStatus::Running);
        node.fail(CandidateError::fault("boom")).unwrap();
        assert_eq!(node.status(), NodeStatus::Failed);
        assert!(node.metric_value().is_none());
        assert!(node.finished_at().unwrap() >= node.started_at().unwrap());
    }

    #[test]
    fn test_pending_cannot_fail_directly() {
        let mut node = Node::new(NodeId(0), None, 1);
        let err = node.fail(CandidateError::fault("early")).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: NodeStatus::Pending,
                to: NodeStatus::Failed,
                ..
            }
        ));
        assert_eq!(node.status(), NodeStatus::Pending);
    }

    #[test]
    fn test_node_id_display_and_order() {
        assert_eq!(NodeId(7).to_string(), "n7");
        assert!(NodeId(1) < NodeId(2));
    }
}
