//! Build orchestration: the search loop
//!
//! One [`ModelBuilder::build`] call owns a fresh solution graph and budget.
//! Each round:
//! 1. stop if the target was reached or the budget has no capacity,
//! 2. ask the search strategy for the parent to expand (or a fresh attempt),
//! 3. dispatch up to `parallelism` candidates under that parent, each one
//!    atomically acquiring an iteration,
//! 4. wait for every dispatched candidate to be recorded.
//!
//! Candidates are generated, trained and scored under one per-candidate
//! deadline. Failures stay on their node; only data, configuration and graph
//! contract violations abort the build.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::budget::{BudgetManager, CancellationFlag};
use crate::config::BuildConfig;
use crate::data::{project_by_name, DataSource, HoldoutSplit, TaskSchema};
use crate::error::CandidateError;
use crate::evaluator::Evaluator;
use crate::generator::{CandidateGenerator, DataGenerator, GenerationMode, GenerationRequest};
use crate::graph::{Artifact, Node, NodeId, NodeStatus, SolutionGraph};
use crate::metric::Metric;
use crate::sandbox::{join_error_message, run_detached, Execution, ExecutionSandbox, JobFailure};
use crate::search::{RequestTemplate, SearchStrategy};
use crate::selector::Selector;
use crate::{Error, Result};

/// Why the search loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// Time or iteration budget ran out with at least one success.
    BudgetExhausted,
    /// A candidate reached the configured target metric.
    TargetReached,
    /// No candidate succeeded.
    AllCandidatesFailed,
    /// The caller cancelled the build.
    Cancelled,
}

impl TerminalReason {
    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::TargetReached => "target_reached",
            Self::AllCandidatesFailed => "all_candidates_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one build call.
pub struct BuildRequest {
    /// Caller-supplied rows.
    pub dataset: Option<DataSource>,
    /// Synthetic rows to request from the data generator.
    pub generate_samples: Option<usize>,
    /// Candidate generation provider.
    pub generator: Arc<dyn CandidateGenerator>,
    /// Synthetic data provider (required with `generate_samples`).
    pub data_generator: Option<Arc<dyn DataGenerator>>,
    /// Overall wall-clock limit.
    pub timeout: Option<Duration>,
    /// Maximum number of candidates.
    pub max_iterations: Option<u64>,
    /// External cancellation switch.
    pub cancellation: Option<CancellationFlag>,
}

impl BuildRequest {
    /// Request with only a generator; add data and budget with the setters.
    #[must_use]
    pub fn new(generator: Arc<dyn CandidateGenerator>) -> Self {
        Self {
            dataset: None,
            generate_samples: None,
            generator,
            data_generator: None,
            timeout: None,
            max_iterations: None,
            cancellation: None,
        }
    }

    /// Use `dataset` as training and holdout rows.
    #[must_use]
    pub fn dataset(mut self, dataset: DataSource) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Request `count` synthetic rows from `data_generator`.
    #[must_use]
    pub fn generate_samples(mut self, count: usize, data_generator: Arc<dyn DataGenerator>) -> Self {
        self.generate_samples = Some(count);
        self.data_generator = Some(data_generator);
        self
    }

    /// Bound the build's wall-clock time.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bound the number of candidates.
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    /// Attach an external cancellation switch.
    #[must_use]
    pub fn cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }
}

impl std::fmt::Debug for BuildRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildRequest")
            .field("dataset_rows", &self.dataset.as_ref().map(DataSource::num_rows))
            .field("generate_samples", &self.generate_samples)
            .field("timeout", &self.timeout)
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

/// Outcome of one build: the winner (if any), the full graph and why it stopped.
#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    build_id: Uuid,
    best: Option<NodeId>,
    metric: Metric,
    terminal_reason: TerminalReason,
    iterations: u64,
    elapsed: Duration,
    graph: SolutionGraph,
}

impl BuildResult {
    /// Unique id of this build.
    #[must_use]
    pub const fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Winning node id, `None` if every candidate failed.
    #[must_use]
    pub const fn best(&self) -> Option<NodeId> {
        self.best
    }

    /// Winning node.
    #[must_use]
    pub fn best_node(&self) -> Option<&Node> {
        self.best.and_then(|id| self.graph.node(id))
    }

    /// Winning metric value.
    #[must_use]
    pub fn best_metric(&self) -> Option<f64> {
        self.best_node().and_then(Node::metric_value)
    }

    /// Metric the build optimized.
    #[must_use]
    pub const fn metric(&self) -> &Metric {
        &self.metric
    }

    /// Why the loop stopped.
    #[must_use]
    pub const fn terminal_reason(&self) -> TerminalReason {
        self.terminal_reason
    }

    /// Candidates dispatched.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Wall-clock duration of the build.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Every node with its outcome, for diagnostics.
    #[must_use]
    pub const fn graph(&self) -> &SolutionGraph {
        &self.graph
    }

    /// Top `k` succeeded nodes, best first.
    #[must_use]
    pub fn leaderboard(&self, k: usize) -> Vec<&Node> {
        Selector::leaderboard(&self.graph, &self.metric, k)
    }

    /// Pretty-printed JSON of the result (model payloads and file bytes omitted).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn diagnostics_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Hand the winning artifact to a packaging routine.
    #[must_use]
    pub fn into_best_artifact(self) -> Option<Artifact> {
        let best = self.best?;
        self.graph.node(best).and_then(Node::artifact).cloned()
    }
}

/// Entry point: describes the task, then runs builds against it.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use modelsmith::{BuildRequest, DataSource, Metric, ModelBuilder};
/// # use modelsmith::generator::CandidateGenerator;
///
/// # async fn run(generator: Arc<dyn CandidateGenerator>) -> modelsmith::Result<()> {
/// let result = ModelBuilder::new("predict house prices from size and location")
///     .metric(Metric::rmse())
///     .build(
///         BuildRequest::new(generator)
///             .dataset(DataSource::load_parquet("data/houses.parquet")?)
///             .timeout(Duration::from_secs(600))
///             .max_iterations(10),
///     )
///     .await?;
///
/// if let Some(node) = result.best_node() {
///     println!("best {} = {:?}", node.id(), node.metric_value());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    intent: String,
    input_schema: Option<SchemaRef>,
    output_schema: Option<SchemaRef>,
    metric: Metric,
    config: BuildConfig,
    sandbox: ExecutionSandbox,
}

impl ModelBuilder {
    /// Start describing a model from its natural-language intent.
    #[must_use]
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            input_schema: None,
            output_schema: None,
            metric: Metric::default(),
            config: BuildConfig::default(),
            sandbox: ExecutionSandbox::new(),
        }
    }

    /// Feature columns (default: every dataset column not in the output).
    #[must_use]
    pub fn input_schema(mut self, schema: SchemaRef) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Target columns (default: the last dataset column).
    #[must_use]
    pub fn output_schema(mut self, schema: SchemaRef) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Metric to optimize (default: rmse).
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Build tunables.
    #[must_use]
    pub fn config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    /// Sandbox used for candidate runs.
    #[must_use]
    pub fn sandbox(mut self, sandbox: ExecutionSandbox) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Run one build.
    ///
    /// # Errors
    ///
    /// - [`Error::InsufficientData`] if no rows can be obtained
    /// - [`Error::InvalidConfig`] / [`Error::SchemaMismatch`] if the task
    ///   cannot be set up
    /// - [`Error::InvalidTransition`] / [`Error::UnknownNode`] on an internal
    ///   graph contract violation
    ///
    /// Candidate failures never produce an error; they are recorded on the
    /// graph and reported through [`BuildResult::terminal_reason`].
    #[instrument(name = "build", skip_all, fields(intent = %self.intent, metric = self.metric.name()))]
    pub async fn build(&self, request: BuildRequest) -> Result<BuildResult> {
        let BuildRequest {
            dataset,
            generate_samples,
            generator,
            data_generator,
            timeout,
            max_iterations,
            cancellation,
        } = request;
        let budget = BudgetManager::with_cancellation(timeout, max_iterations, cancellation.unwrap_or_default());

        self.config.validate()?;
        self.metric.kind()?;
        if budget.is_unbounded() {
            warn!("neither timeout nor max_iterations set; build runs until target or cancellation");
        }

        let (task, data) = self
            .prepare_data(dataset, generate_samples, data_generator, &budget)
            .await?;
        let split = HoldoutSplit::new(&data, &task, self.config.holdout_fraction, self.config.split_seed)?;
        if split.holdout().is_empty() {
            warn!(rows = data.num_rows(), "holdout is empty; every candidate will fail evaluation");
        }

        let build_id = Uuid::new_v4();
        info!(
            %build_id,
            train_rows = split.train().num_rows(),
            holdout_rows = split.holdout().len(),
            prepared_in = ?budget.elapsed(),
            ?timeout,
            ?max_iterations,
            "build started"
        );

        let ctx = Arc::new(BuildContext {
            template: RequestTemplate {
                intent: self.intent.clone(),
                input_schema: task.input().clone(),
                output_schema: task.output().clone(),
                metric: self.metric.clone(),
                allowed_packages: self.config.allowed_packages.clone(),
            },
            generator,
            sandbox: self.sandbox.clone(),
            evaluator: Arc::new(Evaluator::new(
                self.metric.clone(),
                Arc::new(split.holdout().clone()),
                self.config.scoring_chunk_rows,
            )?),
            train: Arc::new(split.train().clone()),
            graph: Mutex::new(SolutionGraph::new()),
        });

        let strategy = SearchStrategy::new(self.config.refinement_retry_ceiling);
        let mut target_reached = false;

        while !target_reached && budget.has_capacity() {
            let mode = strategy.next_mode(&*ctx.graph.lock().await, &self.metric);
            let limit = budget.candidate_limit(self.config.candidate_timeout());

            let mut wave = Vec::with_capacity(self.config.parallelism);
            for _ in 0..self.config.parallelism {
                if !budget.try_acquire() {
                    break;
                }
                let (id, request) = ctx.dispatch(mode).await?;
                debug!(node = %id, ?mode, iteration = budget.iterations_consumed(), "candidate dispatched");
                let task_ctx = Arc::clone(&ctx);
                let handle = tokio::spawn(async move { task_ctx.run_candidate(id, request, limit).await });
                wave.push((id, handle));
            }
            if wave.is_empty() {
                break;
            }

            let mut first_error = None;
            for (id, handle) in wave {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(join_error) => {
                        // Training, scoring and packaging are isolated; only
                        // the generator runs on the task itself.
                        let error = CandidateError::generation(format!(
                            "generator panicked: {}",
                            join_error_message(join_error)
                        ));
                        ctx.record_failure(id, error).await
                    }
                };
                if let Err(e) = outcome {
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }

            if let Some(target) = self.config.target_metric {
                let graph = ctx.graph.lock().await;
                target_reached = Selector::best(&graph, &self.metric)
                    .and_then(Node::metric_value)
                    .is_some_and(|value| self.metric.reaches(value, target));
            }
        }

        let graph = std::mem::take(&mut *ctx.graph.lock().await);
        let best = Selector::best(&graph, &self.metric).map(Node::id);
        let terminal_reason = if target_reached {
            TerminalReason::TargetReached
        } else if best.is_none() {
            TerminalReason::AllCandidatesFailed
        } else if budget.is_cancelled() {
            TerminalReason::Cancelled
        } else {
            TerminalReason::BudgetExhausted
        };

        let result = BuildResult {
            build_id,
            best,
            metric: self.metric.clone(),
            terminal_reason,
            iterations: budget.iterations_consumed(),
            elapsed: budget.elapsed(),
            graph,
        };
        info!(
            %build_id,
            reason = %result.terminal_reason,
            nodes = result.graph.len(),
            succeeded = result.graph.count_status(NodeStatus::Succeeded),
            best = ?result.best,
            best_metric = ?result.best_metric(),
            elapsed = ?result.elapsed,
            "build finished"
        );
        Ok(result)
    }

    /// Resolve the task schema and assemble all rows in training-schema order.
    ///
    /// Sample generation counts against the build's time budget.
    async fn prepare_data(
        &self,
        dataset: Option<DataSource>,
        generate_samples: Option<usize>,
        data_generator: Option<Arc<dyn DataGenerator>>,
        budget: &BudgetManager,
    ) -> Result<(TaskSchema, RecordBatch)> {
        if dataset.is_none() && generate_samples.is_none() {
            return Err(Error::InsufficientData(
                "no dataset and no sample generation request".to_string(),
            ));
        }
        let dataset = dataset.unwrap_or_default();
        let task = TaskSchema::resolve(
            dataset.schema().as_ref(),
            self.input_schema.clone(),
            self.output_schema.clone(),
        )?;
        let training_schema = task.training_schema();

        let mut batches = Vec::new();
        if !dataset.is_empty() {
            batches.push(dataset.concat_projected(&training_schema)?);
        }

        if let Some(count) = generate_samples.filter(|&n| n > 0) {
            let data_generator = data_generator.ok_or_else(|| {
                Error::InsufficientData("sample generation requested without a data generator".to_string())
            })?;
            let generation = data_generator.generate(training_schema.clone(), count);
            let generated = match budget.remaining_time() {
                Some(left) => tokio::time::timeout(left, generation).await.map_err(|_| {
                    Error::InsufficientData(format!(
                        "data generator did not finish within the build timeout ({left:?} remaining)"
                    ))
                })?,
                None => generation.await,
            }
            .map_err(|e| Error::InsufficientData(format!("data generator failed: {e:#}")))?;
            let generated = project_by_name(&generated, &training_schema).map_err(|e| {
                Error::InsufficientData(format!("generated rows do not match the task schema: {e}"))
            })?;
            info!(requested = count, generated = generated.num_rows(), "synthetic rows generated");
            batches.push(generated);
        }

        let data = arrow::compute::concat_batches(&training_schema, batches.iter())?;
        if data.num_rows() == 0 {
            return Err(Error::InsufficientData("data source has no rows".to_string()));
        }
        Ok((task, data))
    }
}

/// Per-build state shared by the loop and in-flight candidates.
struct BuildContext {
    template: RequestTemplate,
    generator: Arc<dyn CandidateGenerator>,
    sandbox: ExecutionSandbox,
    evaluator: Arc<Evaluator>,
    train: Arc<RecordBatch>,
    graph: Mutex<SolutionGraph>,
}

impl BuildContext {
    /// Create a running node under `mode`'s parent and its generation request.
    async fn dispatch(&self, mode: GenerationMode) -> Result<(NodeId, GenerationRequest)> {
        let parent = match mode {
            GenerationMode::Fresh => None,
            GenerationMode::Refine { parent } => Some(parent),
        };
        let mut graph = self.graph.lock().await;
        let request = self.template.request(&graph, mode);
        let id = graph.create_node(parent)?;
        graph.mark_running(id)?;
        Ok((id, request))
    }

    /// Generate, train and score one candidate; record the outcome on `id`.
    async fn run_candidate(&self, id: NodeId, request: GenerationRequest, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        let time_left = || deadline.saturating_duration_since(Instant::now());

        let candidate = match tokio::time::timeout(time_left(), self.generator.generate(&request)).await {
            Ok(Ok(candidate)) => candidate,
            Ok(Err(e)) => return self.record_failure(id, CandidateError::generation(format!("{e:#}"))).await,
            Err(_) => {
                let error = CandidateError::generation(format!(
                    "generation did not finish within {}ms",
                    limit.as_millis()
                ));
                return self.record_failure(id, error).await;
            }
        };
        let source = candidate.source();
        self.graph.lock().await.attach_source(id, source.clone())?;

        let execution = match self
            .sandbox
            .run(id, Arc::clone(&candidate.trainer), Arc::clone(&self.train), time_left())
            .await
        {
            Ok(execution) => execution,
            Err(CandidateError::ExecutionTimeout { .. }) => {
                return self.record_failure(id, CandidateError::timeout(limit)).await;
            }
            Err(e) => return self.record_failure(id, e).await,
        };

        let value = match Arc::clone(&self.evaluator)
            .evaluate_isolated(Arc::clone(&execution.model), time_left())
            .await
        {
            Ok(value) => value,
            Err(e) => return self.record_failure(id, e).await,
        };

        let Execution { model, files, duration } = execution;
        let packaging = run_detached(format!("modelsmith-package-{id}"), time_left(), move || {
            Artifact::new(source, model, files)
        });
        let artifact = match packaging.await {
            Ok(artifact) => artifact,
            Err(JobFailure::Panicked(message)) => {
                let error = CandidateError::fault(format!("model serialization panicked: {message}"));
                return self.record_failure(id, error).await;
            }
            Err(JobFailure::TimedOut) => return self.record_failure(id, CandidateError::timeout(limit)).await,
            Err(JobFailure::Lost(message)) => return self.record_failure(id, CandidateError::fault(message)).await,
        };
        self.graph.lock().await.mark_succeeded(id, artifact, value)?;
        info!(
            node = %id,
            metric = value,
            train_time = ?duration,
            "candidate succeeded"
        );
        Ok(())
    }

    async fn record_failure(&self, id: NodeId, error: CandidateError) -> Result<()> {
        warn!(node = %id, kind = %error.kind(), %error, "candidate failed");
        self.graph.lock().await.mark_failed(id, error)
    }
}
