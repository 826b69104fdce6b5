//! Selector: best node and leaderboard over succeeded candidates
//!
//! **Order**: better metric value first (per the metric's direction), ties
//! broken by creation order. Node ids are arena indices, so comparing ids
//! compares creation order.
//!
//! **Leaderboard**: heap-based Top-K selection, O(N log K), instead of a
//! full sort of every succeeded node.
//!
//! Toyota Way Principles:
//! - **Muda elimination**: avoid sorting nodes that cannot make the top K
//! - **Jidoka**: a build with zero successes is reported, never papered over

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::graph::{Node, SolutionGraph};
use crate::metric::Metric;

/// Picks the winning node of a build and ranks the runners-up.
#[derive(Debug, Clone, Copy, Default)]
pub struct Selector;

impl Selector {
    /// Best succeeded node, or `None` if nothing succeeded.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modelsmith::graph::SolutionGraph;
    /// use modelsmith::metric::Metric;
    /// use modelsmith::selector::Selector;
    ///
    /// let graph = SolutionGraph::new();
    /// assert!(Selector::best(&graph, &Metric::accuracy()).is_none());
    /// ```
    #[must_use]
    pub fn best<'g>(graph: &'g SolutionGraph, metric: &Metric) -> Option<&'g Node> {
        graph
            .succeeded()
            .min_by(|a, b| rank_order(metric, a, b))
    }

    /// All succeeded nodes, best first.
    #[must_use]
    pub fn ranked<'g>(graph: &'g SolutionGraph, metric: &Metric) -> Vec<&'g Node> {
        let mut nodes: Vec<&Node> = graph.succeeded().collect();
        nodes.sort_by(|a, b| rank_order(metric, a, b));
        nodes
    }

    /// Top `k` succeeded nodes, best first.
    ///
    /// Time complexity: O(N log K) where N = succeeded nodes.
    #[must_use]
    pub fn leaderboard<'g>(graph: &'g SolutionGraph, metric: &Metric, k: usize) -> Vec<&'g Node> {
        if k == 0 {
            return Vec::new();
        }

        // Max-heap on rank: the top is the worst node kept so far
        let mut heap: BinaryHeap<RankedItem<'_, 'g>> = BinaryHeap::with_capacity(k + 1);
        for node in graph.succeeded() {
            heap.push(RankedItem { metric, node });
            if heap.len() > k {
                heap.pop();
            }
        }

        heap.into_sorted_vec().into_iter().map(|item| item.node).collect()
    }
}

/// `Ordering::Less` when `a` ranks ahead of `b`.
fn rank_order(metric: &Metric, a: &Node, b: &Node) -> Ordering {
    let a_value = a.metric_value().unwrap_or(f64::NAN);
    let b_value = b.metric_value().unwrap_or(f64::NAN);
    metric
        .compare(a_value, b_value)
        .then_with(|| a.id().cmp(&b.id()))
}

// Heap item ordered by rank (worse ranks compare greater)
struct RankedItem<'m, 'g> {
    metric: &'m Metric,
    node: &'g Node,
}

impl PartialEq for RankedItem<'_, '_> {
    fn eq(&self, other: &Self) -> bool {
        self.node.id() == other.node.id()
    }
}

impl Eq for RankedItem<'_, '_> {}

impl Ord for RankedItem<'_, '_> {
    fn cmp(&self, other: &Self) -> Ordering {
        rank_order(self.metric, self.node, other.node)
    }
}

impl PartialOrd for RankedItem<'_, '_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use arrow::record_batch::RecordBatch;

    use crate::error::CandidateError;
    use crate::generator::TrainedModel;
    use crate::graph::{Artifact, CandidateSource, NodeId, SolutionGraph};

    pub struct NullModel;

    impl TrainedModel for NullModel {
        fn predict(&self, features: &RecordBatch) -> anyhow::Result<Vec<f64>> {
            Ok(vec![0.0; features.num_rows()])
        }
    }

    /// Record a finished attempt: `Some(value)` succeeds, `None` fails.
    pub fn record(graph: &mut SolutionGraph, parent: Option<NodeId>, outcome: Option<f64>) -> NodeId {
        let id = graph.create_node(parent).unwrap();
        graph.mark_running(id).unwrap();
        let source = CandidateSource {
            plan: format!("plan {id}"),
            code: format!("code {id}"),
        };
        graph.attach_source(id, source.clone()).unwrap();
        match outcome {
            Some(value) => {
                let artifact = Artifact::new(source, Arc::new(NullModel), Vec::new());
                graph.mark_succeeded(id, artifact, value).unwrap();
            }
            None => graph
                .mark_failed(id, CandidateError::fault("boom"))
                .unwrap(),
        }
        id
    }
}
