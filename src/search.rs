//! Search Strategy: which node to refine next
//!
//! Best-first with an exploration fallback:
//! 1. Rank succeeded nodes best first (creation order breaks ties).
//! 2. Refine the highest-ranked node whose failed refinements are still
//!    below the retry ceiling.
//! 3. If no node qualifies (nothing succeeded yet, or every branch is
//!    exhausted), start a fresh attempt from the root.
//!
//! The strategy holds no state of its own. Every decision is a pure function
//! of the graph, so replaying the same generator/execution outcomes replays
//! the same search.

use arrow::datatypes::SchemaRef;

use crate::generator::{AttemptSummary, GenerationMode, GenerationRequest};
use crate::graph::{Node, NodeId, NodeStatus, SolutionGraph};
use crate::metric::Metric;
use crate::selector::Selector;

/// Best-first expansion policy with a per-node refinement retry ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchStrategy {
    retry_ceiling: usize,
}

impl SearchStrategy {
    /// Create a strategy that abandons a node after `retry_ceiling` failed
    /// refinements.
    #[must_use]
    pub const fn new(retry_ceiling: usize) -> Self {
        Self { retry_ceiling }
    }

    /// Failed refinements tolerated per node.
    #[must_use]
    pub const fn retry_ceiling(&self) -> usize {
        self.retry_ceiling
    }

    /// Decide the next expansion.
    #[must_use]
    pub fn next_mode(&self, graph: &SolutionGraph, metric: &Metric) -> GenerationMode {
        Selector::ranked(graph, metric)
            .into_iter()
            .find(|node| self.is_refinable(graph, node))
            .map_or(GenerationMode::Fresh, |node| GenerationMode::Refine { parent: node.id() })
    }

    fn is_refinable(&self, graph: &SolutionGraph, node: &Node) -> bool {
        failed_refinements(graph, node.id()) < self.retry_ceiling
    }

    /// Feedback for a new node under `mode`'s parent: ancestors nearest first,
    /// then finished siblings oldest first.
    #[must_use]
    pub fn context(graph: &SolutionGraph, mode: GenerationMode) -> (Vec<AttemptSummary>, Vec<AttemptSummary>) {
        let parent = match mode {
            GenerationMode::Fresh => None,
            GenerationMode::Refine { parent } => Some(parent),
        };

        let ancestors = parent
            .and_then(|id| graph.node(id))
            .map(|node| {
                std::iter::once(node)
                    .chain(graph.ancestors(node.id()))
                    .filter_map(AttemptSummary::from_node)
                    .collect()
            })
            .unwrap_or_default();

        let prior_siblings = graph
            .children_of_parent(parent)
            .into_iter()
            .filter_map(AttemptSummary::from_node)
            .collect();

        (ancestors, prior_siblings)
    }
}

impl Default for SearchStrategy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_REFINEMENT_RETRY_CEILING)
    }
}

/// Failed children of `id`.
#[must_use]
pub fn failed_refinements(graph: &SolutionGraph, id: NodeId) -> usize {
    graph
        .children_of(id)
        .iter()
        .filter(|child| child.status() == NodeStatus::Failed)
        .count()
}

/// Fixed parts of every generation request in one build.
#[derive(Debug, Clone)]
pub struct RequestTemplate {
    /// Natural-language description of the desired model.
    pub intent: String,
    /// Feature columns.
    pub input_schema: SchemaRef,
    /// Target columns.
    pub output_schema: SchemaRef,
    /// Build metric.
    pub metric: Metric,
    /// Packages generated code may use.
    pub allowed_packages: Vec<String>,
}

impl RequestTemplate {
    /// Assemble the request for the next expansion.
    #[must_use]
    pub fn request(&self, graph: &SolutionGraph, mode: GenerationMode) -> GenerationRequest {
        let (ancestors, prior_siblings) = SearchStrategy::context(graph, mode);
        GenerationRequest {
            intent: self.intent.clone(),
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            metric: self.metric.clone(),
            allowed_packages: self.allowed_packages.clone(),
            mode,
            ancestors,
            prior_siblings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::AttemptOutcome;
    use crate::selector::test_support::record;

    #[test]
    fn test_empty_graph_starts_fresh() {
        let graph = SolutionGraph::new();
        assert_eq!(
            SearchStrategy::default().next_mode(&graph, &Metric::accuracy()),
            GenerationMode::Fresh
        );
    }

    #[test]
    fn test_only_failures_starts_fresh() {
        let mut graph = SolutionGraph::new();
        record(&mut graph, None, None);
        record(&mut graph, None, None);
        assert_eq!(
            SearchStrategy::new(3).next_mode(&graph, &Metric::accuracy()),
            GenerationMode::Fresh
        );
    }

    #[test]
    fn test_refines_best_node() {
        let mut graph = SolutionGraph::new();
        record(&mut graph, None, Some(0.6));
        let best = record(&mut graph, None, Some(0.8));
        assert_eq!(
            SearchStrategy::new(3).next_mode(&graph, &Metric::accuracy()),
            GenerationMode::Refine { parent: best }
        );
    }

    #[test]
    fn test_tie_refines_earliest() {
        let mut graph = SolutionGraph::new();
        let first = record(&mut graph, None, Some(0.7));
        record(&mut graph, None, Some(0.7));
        assert_eq!(
            SearchStrategy::new(3).next_mode(&graph, &Metric::accuracy()),
            GenerationMode::Refine { parent: first }
        );
    }

    #[test]
    fn test_falls_back_to_next_best_then_root() {
        let mut graph = SolutionGraph::new();
        let runner_up = record(&mut graph, None, Some(0.6));
        let best = record(&mut graph, None, Some(0.8));
        let strategy = SearchStrategy::new(2);
        let metric = Metric::accuracy();

        record(&mut graph, Some(best), None);
        assert_eq!(strategy.next_mode(&graph, &metric), GenerationMode::Refine { parent: best });
        record(&mut graph, Some(best), None);
        assert_eq!(strategy.next_mode(&graph, &metric), GenerationMode::Refine { parent: runner_up });

        record(&mut graph, Some(runner_up), None);
        record(&mut graph, Some(runner_up), None);
        assert_eq!(strategy.next_mode(&graph, &metric), GenerationMode::Fresh);
    }

    #[test]
    fn test_zero_ceiling_always_fresh() {
        let mut graph = SolutionGraph::new();
        record(&mut graph, None, Some(0.9));
        assert_eq!(
            SearchStrategy::new(0).next_mode(&graph, &Metric::accuracy()),
            GenerationMode::Fresh
        );
    }

    #[test]
    fn test_context_collects_ancestors_and_siblings() {
        let mut graph = SolutionGraph::new();
        let root = record(&mut graph, None, Some(0.5));
        let child = record(&mut graph, Some(root), Some(0.6));
        let failed = record(&mut graph, Some(child), None);
        // Pending siblings carry no feedback
        graph.create_node(Some(child)).unwrap();

        let (ancestors, siblings) = SearchStrategy::context(&graph, GenerationMode::Refine { parent: child });
        let ancestor_ids: Vec<NodeId> = ancestors.iter().map(|s| s.node).collect();
        assert_eq!(ancestor_ids, vec![child, root]);
        assert_eq!(siblings.len(), 1);
        assert_eq!(siblings[0].node, failed);
        assert!(matches!(siblings[0].outcome, AttemptOutcome::Failed { .. }));
    }

    #[test]
    fn test_fresh_context_lists_previous_roots() {
        let mut graph = SolutionGraph::new();
        record(&mut graph, None, None);
        record(&mut graph, None, Some(0.1));

        let (ancestors, siblings) = SearchStrategy::context(&graph, GenerationMode::Fresh);
        assert!(ancestors.is_empty());
        assert_eq!(siblings.len(), 2);
    }

    #[test]
    fn test_request_carries_prior_failures() {
        let mut graph = SolutionGraph::new();
        let root = record(&mut graph, None, Some(0.5));
        record(&mut graph, Some(root), None);

        let schema = std::sync::Arc::new(arrow::datatypes::Schema::empty());
        let template = RequestTemplate {
            intent: "predict y".to_string(),
            input_schema: schema.clone(),
            output_schema: schema,
            metric: Metric::rmse(),
            allowed_packages: vec!["numpy".to_string()],
        };
        let request = template.request(&graph, GenerationMode::Refine { parent: root });
        assert_eq!(request.prior_failures().count(), 1);
        assert_eq!(request.allowed_packages, vec!["numpy"]);
    }
}
