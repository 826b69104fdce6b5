//! Tests for error types

use std::time::Duration;

use modelsmith::{CandidateError, Error, FailureKind, NodeId, NodeStatus, SolutionGraph};

#[test]
fn test_insufficient_data_error() {
    let error = Error::InsufficientData("no dataset and no sample generation request".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Insufficient data"));
    assert!(error_str.contains("Supply a dataset"));
}

#[test]
fn test_invalid_transition_error() {
    let mut graph = SolutionGraph::new();
    let id = graph.create_node(None).unwrap();
    let error = graph.mark_failed(id, CandidateError::fault("x")).unwrap_err();
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid transition for node n0"));
    assert!(error_str.contains("pending -> failed"));
    assert!(error_str.contains("Please report this issue"));
    assert!(matches!(
        error,
        Error::InvalidTransition {
            from: NodeStatus::Pending,
            to: NodeStatus::Failed,
            ..
        }
    ));
}

#[test]
fn test_unknown_node_error() {
    let graph = SolutionGraph::new();
    let error = graph.get(first_node_id()).unwrap_err();
    assert!(format!("{error}").contains("Unknown node: n0"));
}

#[test]
fn test_invalid_config_error() {
    let error = Error::InvalidConfig("parallelism must be greater than 0".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid configuration"));
    assert!(error_str.contains("parallelism"));
}

#[test]
fn test_storage_error() {
    let error = modelsmith::DataSource::load_parquet("/nonexistent/houses.parquet").unwrap_err();
    let error_str = format!("{error}");
    assert!(error_str.contains("Storage error"));
    assert!(error_str.contains("Failed to open Parquet file"));
}

#[test]
fn test_json_error_from_config() {
    let error = modelsmith::BuildConfig::from_json("{ not json").unwrap_err();
    assert!(matches!(error, Error::Json(_)));
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_io_error_conversion() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "work dir gone");
    let error: Error = io_error.into();
    assert!(format!("{error}").contains("IO error"));
}

#[test]
fn test_candidate_error_messages() {
    assert_eq!(
        CandidateError::generation("rate limited").to_string(),
        "Candidate generation failed: rate limited"
    );
    assert_eq!(
        CandidateError::timeout(Duration::from_secs(5)).to_string(),
        "Candidate execution timed out after 5000ms"
    );
    assert!(CandidateError::evaluation("holdout set is empty")
        .to_string()
        .contains("evaluation failed"));
}

#[test]
fn test_candidate_error_kinds() {
    assert_eq!(CandidateError::fault("x").kind(), FailureKind::ExecutionFault);
    assert_eq!(
        CandidateError::timeout(Duration::from_millis(1)).kind(),
        FailureKind::ExecutionTimeout
    );
    assert_eq!(FailureKind::EvaluationFailed.to_string(), "evaluation_failed");
}

#[test]
fn test_candidate_error_serializes_with_kind_tag() {
    let json = serde_json::to_value(CandidateError::timeout(Duration::from_millis(250))).unwrap();
    assert_eq!(json["kind"], "execution_timeout");
    assert_eq!(json["limit_ms"], 250);

    let back: CandidateError = serde_json::from_value(json).unwrap();
    assert_eq!(back.kind(), FailureKind::ExecutionTimeout);
}

fn first_node_id() -> NodeId {
    let mut graph = SolutionGraph::new();
    graph.create_node(None).unwrap()
}
