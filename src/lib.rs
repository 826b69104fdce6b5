//! # modelsmith: Build Orchestration Engine
//!
//! **Version**: 0.1.0
//!
//! modelsmith turns a natural-language intent plus a tabular data source into
//! a trained predictor by searching over generated candidate implementations.
//! Each build:
//! - asks an external [`CandidateGenerator`] for candidates (fresh attempts
//!   or refinements of the best node so far),
//! - trains each candidate in an isolated, time-limited sandbox,
//! - scores it on a holdout split shared by every candidate,
//! - records every attempt in a solution graph and returns the best one.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: candidate faults are recorded on their node, never abort the build
//! - **Poka-Yoke**: node status transitions are checked; the graph is an
//!   append-only arena, so it cannot form cycles
//! - **Heijunka**: time and iteration budgets are fixed at build start
//! - **Genchi Genbutsu**: the full graph is returned for diagnosis
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modelsmith::{BuildRequest, DataSource, Metric, ModelBuilder, TerminalReason};
//! # use modelsmith::generator::CandidateGenerator;
//!
//! # async fn run(generator: Arc<dyn CandidateGenerator>) -> modelsmith::Result<()> {
//! modelsmith::logging::init();
//!
//! let result = ModelBuilder::new("predict churn from account activity")
//!     .metric(Metric::accuracy())
//!     .build(
//!         BuildRequest::new(generator)
//!             .dataset(DataSource::load_parquet("data/accounts.parquet")?)
//!             .timeout(Duration::from_secs(900))
//!             .max_iterations(20),
//!     )
//!     .await?;
//!
//! match result.terminal_reason() {
//!     TerminalReason::AllCandidatesFailed => eprintln!("{}", result.diagnostics_json()?),
//!     reason => println!("{reason}: best = {:?}", result.best_metric()),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod budget;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod graph;
pub mod logging;
pub mod metric;
pub mod orchestrator;
pub mod sandbox;
pub mod search;
pub mod selector;

pub use budget::{BudgetManager, CancellationFlag};
pub use config::BuildConfig;
pub use data::{DataSource, HoldoutSplit, TaskSchema};
pub use error::{CandidateError, Error, FailureKind, Result};
pub use evaluator::Evaluator;
pub use generator::{
    AttemptOutcome, AttemptSummary, Candidate, CandidateGenerator, DataGenerator, GenerationMode,
    GenerationRequest, TrainedModel, Trainer,
};
pub use graph::{Artifact, ArtifactFile, Node, NodeId, NodeStatus, SolutionGraph};
pub use metric::{Direction, Metric, MetricKind};
pub use orchestrator::{BuildRequest, BuildResult, ModelBuilder, TerminalReason};
pub use sandbox::{ExecutionContext, ExecutionSandbox};
pub use search::SearchStrategy;
pub use selector::Selector;
