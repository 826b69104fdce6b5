//! Solution Graph - arena of candidate nodes
//!
//! Nodes live in a `Vec` indexed by [`NodeId`]; each node stores only its
//! parent pointer. There are no back-edges and no re-parenting, so the graph
//! is a tree by construction. A child index (`FxHashMap`) answers
//! `children_of` without scanning.

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::{Artifact, CandidateSource, Node, NodeId, NodeStatus};
use crate::error::CandidateError;
use crate::{Error, Result};

/// Rooted tree of candidate attempts for one build.
///
/// The root is implicit: nodes created with `parent = None` are fresh
/// attempts hanging directly off it.
///
/// ## Example
///
/// ```rust
/// use modelsmith::graph::{NodeStatus, SolutionGraph};
/// use modelsmith::CandidateError;
///
/// let mut graph = SolutionGraph::new();
/// let first = graph.create_node(None).unwrap();
/// graph.mark_running(first).unwrap();
/// graph.mark_failed(first, CandidateError::fault("boom")).unwrap();
///
/// assert_eq!(graph.node(first).unwrap().status(), NodeStatus::Failed);
/// // Terminal statuses never change again
/// assert!(graph.mark_running(first).is_err());
/// ```
#[derive(Debug, Default, Clone, Serialize)]
pub struct SolutionGraph {
    nodes: Vec<Node>,
    #[serde(skip)]
    children: FxHashMap<NodeId, Vec<NodeId>>,
    #[serde(skip)]
    roots: Vec<NodeId>,
}

impl SolutionGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Create a `Pending` node under `parent` (or under the root for `None`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNode`] if `parent` is not in this graph.
    pub fn create_node(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        let depth = match parent {
            Some(parent_id) => self.get(parent_id)?.depth() + 1,
            None => 1,
        };

        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node::new(id, parent, depth));
        match parent {
            Some(parent_id) => self.children.entry(parent_id).or_default().push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Transition a node `Pending -> Running`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the node is `Pending`.
    pub fn mark_running(&mut self, id: NodeId) -> Result<()> {
        self.get_mut(id)?.start()
    }

    /// Record the generator's plan and code on a non-terminal node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the node already finished.
    pub fn attach_source(&mut self, id: NodeId, source: CandidateSource) -> Result<()> {
        self.get_mut(id)?.attach_source(source)
    }

    /// Transition a node `Running -> Succeeded` with its artifact and score.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the node is `Running`.
    pub fn mark_succeeded(&mut self, id: NodeId, artifact: Artifact, metric_value: f64) -> Result<()> {
        self.get_mut(id)?.succeed(artifact, metric_value)
    }

    /// Transition a node `Running -> Failed` with a structured error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless the node is `Running`.
    pub fn mark_failed(&mut self, id: NodeId, error: CandidateError) -> Result<()> {
        self.get_mut(id)?.fail(error)
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        usize::try_from(id.0).ok().and_then(|i| self.nodes.get(i))
    }

    /// Look up a node, failing on unknown ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNode`] if `id` is not in this graph.
    pub fn get(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or(Error::UnknownNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        usize::try_from(id.0)
            .ok()
            .and_then(|i| self.nodes.get_mut(i))
            .ok_or(Error::UnknownNode(id))
    }

    /// Children of a node, in creation order.
    #[must_use]
    pub fn children_of(&self, id: NodeId) -> Vec<&Node> {
        self.children
            .get(&id)
            .map(|ids| ids.iter().filter_map(|&c| self.node(c)).collect())
            .unwrap_or_default()
    }

    /// Fresh attempts (children of the implicit root), in creation order.
    #[must_use]
    pub fn roots(&self) -> Vec<&Node> {
        self.roots.iter().filter_map(|&id| self.node(id)).collect()
    }

    /// Children of `parent`, or the root attempts for `None`.
    #[must_use]
    pub fn children_of_parent(&self, parent: Option<NodeId>) -> Vec<&Node> {
        parent.map_or_else(|| self.roots(), |id| self.children_of(id))
    }

    /// All nodes, in creation order.
    #[must_use]
    pub fn all_nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Succeeded nodes, in creation order.
    pub fn succeeded(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .filter(|n| n.status() == NodeStatus::Succeeded)
    }

    /// Number of nodes in the given status.
    #[must_use]
    pub fn count_status(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status() == status).count()
    }

    /// Ancestors of a node, nearest first (excluding the node itself).
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Vec<&Node> {
        let mut chain = Vec::new();
        let mut cursor = self.node(id).and_then(Node::parent);
        while let Some(parent_id) = cursor {
            match self.node(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    cursor = parent.parent();
                }
                None => break,
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_default() {
        let graph = SolutionGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
        assert!(graph.roots().is_empty());
    }

    #[test]
    fn test_create_and_children() {
        let mut graph = SolutionGraph::new();
        let root_attempt = graph.create_node(None).unwrap();
        let child_a = graph.create_node(Some(root_attempt)).unwrap();
        let child_b = graph.create_node(Some(root_attempt)).unwrap();

        let children: Vec<NodeId> = graph.children_of(root_attempt).iter().map(|n| n.id()).collect();
        assert_eq!(children, vec![child_a, child_b]);
        assert_eq!(graph.node(child_b).unwrap().depth(), 2);
        assert_eq!(graph.node(child_b).unwrap().parent(), Some(root_attempt));
        assert_eq!(graph.roots().len(), 1);
    }

    #[test]
    fn test_create_under_unknown_parent() {
        let mut graph = SolutionGraph::new();
        let err = graph.create_node(Some(NodeId(9))).unwrap_err();
        assert!(matches!(err, Error::UnknownNode(NodeId(9))));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let mut graph = SolutionGraph::new();
        let a = graph.create_node(None).unwrap();
        let b = graph.create_node(Some(a)).unwrap();
        let c = graph.create_node(Some(b)).unwrap();

        let chain: Vec<NodeId> = graph.ancestors(c).iter().map(|n| n.id()).collect();
        assert_eq!(chain, vec![b, a]);
        assert!(graph.ancestors(a).is_empty());
    }

    #[test]
    fn test_mark_failed_twice_is_invalid() {
        let mut graph = SolutionGraph::new();
        let id = graph.create_node(None).unwrap();
        graph.mark_running(id).unwrap();
        graph.mark_failed(id, CandidateError::fault("x")).unwrap();

        let err = graph.mark_failed(id, CandidateError::fault("y")).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(graph.count_status(NodeStatus::Failed), 1);
    }

    #[test]
    fn test_attach_source_after_finish_is_invalid() {
        let mut graph = SolutionGraph::new();
        let id = graph.create_node(None).unwrap();
        graph.mark_running(id).unwrap();
        let source = CandidateSource {
            plan: "p".into(),
            code: "c".into(),
        };
        graph.attach_source(id, source.clone()).unwrap();
        graph
            .mark_failed(id, CandidateError::evaluation("empty holdout"))
            .unwrap();
        assert!(graph.attach_source(id, source).is_err());
    }
}
