//! Solution Graph: candidate nodes and their refinement relationships
//!
//! ## Schema Overview
//!
//! ```text
//! (implicit root) ──< Node (N) [fresh attempts]
//!                       │
//!                       ├──< Node (N) [refinements]
//!                       └── Artifact (0..1) ──< ArtifactFile (N)
//! ```
//!
//! The graph is pure bookkeeping: it enforces the status state machine and
//! the tree shape, and never interprets metric values or errors.

mod artifact;
mod node;
mod store;

pub use artifact::{content_hash, Artifact, ArtifactFile, CandidateSource};
pub use node::{Node, NodeId, NodeStatus};
pub use store::SolutionGraph;
