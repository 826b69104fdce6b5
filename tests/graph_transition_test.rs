//! Solution graph lifecycle and structure tests

use std::sync::Arc;

use arrow::array::RecordBatch;
use modelsmith::graph::CandidateSource;
use modelsmith::{Artifact, CandidateError, Error, NodeStatus, SolutionGraph, TrainedModel};

struct ZeroModel;

impl TrainedModel for ZeroModel {
    fn predict(&self, features: &RecordBatch) -> anyhow::Result<Vec<f64>> {
        Ok(vec![0.0; features.num_rows()])
    }
}

fn artifact() -> Artifact {
    let source = CandidateSource {
        plan: "mean baseline".to_string(),
        code: "predict(mean)".to_string(),
    };
    Artifact::new(source, Arc::new(ZeroModel), Vec::new())
}

#[test]
fn test_full_success_lifecycle() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    assert_eq!(graph.get(id).unwrap().status(), NodeStatus::Pending);

    graph.mark_running(id).unwrap();
    graph.mark_succeeded(id, artifact(), 0.42).unwrap();

    let node = graph.get(id).unwrap();
    assert_eq!(node.status(), NodeStatus::Succeeded);
    assert_eq!(node.metric_value(), Some(0.42));
    assert!(node.error().is_none());
    assert!(node.finished_at().is_some());
    assert!(node.artifact().is_some());
}

#[test]
fn test_metric_value_only_on_success() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    graph.mark_running(id).unwrap();
    graph.mark_failed(id, CandidateError::evaluation("holdout set is empty")).unwrap();

    let node = graph.get(id).unwrap();
    assert!(node.metric_value().is_none());
    assert!(node.artifact().is_none());
    assert!(node.error().is_some());
}

#[test]
fn test_pending_cannot_finish() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    assert!(matches!(
        graph.mark_succeeded(id, artifact(), 1.0),
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        graph.mark_failed(id, CandidateError::fault("x")),
        Err(Error::InvalidTransition { .. })
    ));
    assert_eq!(graph.get(id).unwrap().status(), NodeStatus::Pending);
}

#[test]
fn test_terminal_status_is_final() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    graph.mark_running(id).unwrap();
    graph.mark_succeeded(id, artifact(), 0.9).unwrap();

    let err = graph.mark_failed(id, CandidateError::fault("late")).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: NodeStatus::Succeeded,
            to: NodeStatus::Failed,
            ..
        }
    ));
    assert!(graph.mark_running(id).is_err());
    assert_eq!(graph.get(id).unwrap().metric_value(), Some(0.9));
}

#[test]
fn test_running_twice_rejected() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    graph.mark_running(id).unwrap();
    assert!(graph.mark_running(id).is_err());
}

#[test]
fn test_source_cannot_change_after_finish() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    graph.mark_running(id).unwrap();
    graph.mark_failed(id, CandidateError::generation("timeout")).unwrap();

    let source = CandidateSource {
        plan: "p".to_string(),
        code: "c".to_string(),
    };
    assert!(graph.attach_source(id, source).is_err());
}

#[test]
fn test_tree_structure() {
    let mut graph = SolutionGraph::new();
    let a = graph.create_node(None).unwrap();
    let b = graph.create_node(None).unwrap();
    let a1 = graph.create_node(Some(a)).unwrap();
    let a2 = graph.create_node(Some(a)).unwrap();
    let a1x = graph.create_node(Some(a1)).unwrap();

    let roots: Vec<_> = graph.roots().iter().map(|n| n.id()).collect();
    assert_eq!(roots, vec![a, b]);
    let children: Vec<_> = graph.children_of(a).iter().map(|n| n.id()).collect();
    assert_eq!(children, vec![a1, a2]);
    assert!(graph.children_of(b).is_empty());

    let ancestors: Vec<_> = graph.ancestors(a1x).iter().map(|n| n.id()).collect();
    assert_eq!(ancestors, vec![a1, a]);
    assert_eq!(graph.get(a1x).unwrap().depth(), 3);
    assert_eq!(graph.all_nodes().len(), 5);
}

#[test]
fn test_unknown_parent_rejected() {
    let mut other = SolutionGraph::new();
    other.create_node(None).unwrap();
    let foreign = other.create_node(None).unwrap();

    let mut graph = SolutionGraph::new();
    assert!(matches!(graph.create_node(Some(foreign)), Err(Error::UnknownNode(_))));
    assert!(graph.is_empty());
}

#[test]
fn test_graph_serializes_without_payloads() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    graph.mark_running(id).unwrap();
    graph.mark_succeeded(id, artifact(), 0.5).unwrap();

    let json = serde_json::to_value(&graph).unwrap();
    let node = &json["nodes"][0];
    assert_eq!(node["status"], "succeeded");
    assert_eq!(node["metric_value"], 0.5);
    assert!(node["artifact"]["content_hash"].as_str().unwrap().starts_with("trueno:"));
    assert!(node["artifact"].get("model").is_none());
}
