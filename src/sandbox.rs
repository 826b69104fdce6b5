//! Execution Sandbox: runs a candidate's training procedure in isolation
//!
//! Every run gets:
//! - a freshly created work directory (`tempfile::TempDir`), removed when the
//!   run returns whether it succeeded, failed or timed out,
//! - a cooperative cancellation flag raised on timeout,
//! - a dedicated worker thread; panics are caught on that thread and
//!   reported instead of unwinding through the orchestration loop.
//!
//! A timed-out trainer cannot be pre-empted mid-instruction. Its thread is
//! never joined: it keeps running until it observes the flag or returns, its
//! result is discarded, and it does not hold up runtime shutdown.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::record_batch::RecordBatch;
use tracing::{debug, instrument, warn};

use crate::error::CandidateError;
use crate::generator::{TrainedModel, Trainer};
use crate::graph::{ArtifactFile, NodeId};

/// Scoped context handed to a trainer for the duration of one run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    node: NodeId,
    work_dir: PathBuf,
    limit: Duration,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Node this run belongs to.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Private directory for intermediate and output files.
    ///
    /// Files left here when training succeeds become artifact files.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Wall-clock limit of this run.
    #[must_use]
    pub const fn limit(&self) -> Duration {
        self.limit
    }

    /// Whether the run was abandoned (timeout); trainers should return promptly.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Output of a successful run.
pub struct Execution {
    /// Trained model returned by the candidate.
    pub model: Arc<dyn TrainedModel>,
    /// Files captured from the work directory, sorted by key.
    pub files: Vec<ArtifactFile>,
    /// Wall-clock training time.
    pub duration: Duration,
}

impl std::fmt::Debug for Execution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Execution")
            .field("files", &self.files)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}

/// Runs candidates under a per-run time limit in scoped work directories.
#[derive(Debug, Clone, Default)]
pub struct ExecutionSandbox {
    base_dir: Option<PathBuf>,
}

impl ExecutionSandbox {
    /// Sandbox creating work directories under the system temp dir.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sandbox creating work directories under `base_dir`.
    #[must_use]
    pub fn in_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn acquire_dir(&self, node: NodeId) -> std::io::Result<tempfile::TempDir> {
        let prefix = format!("modelsmith-{node}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.base_dir {
            Some(base) => builder.tempdir_in(base),
            None => builder.tempdir(),
        }
    }

    /// Train `trainer` on `train` within `limit`.
    ///
    /// # Errors
    ///
    /// - [`CandidateError::ExecutionTimeout`] if training exceeds `limit`
    /// - [`CandidateError::ExecutionFault`] if training errors, panics, or
    ///   the work directory cannot be created or captured
    #[instrument(name = "sandbox_run", skip_all, fields(node = %node, ?limit))]
    pub async fn run(
        &self,
        node: NodeId,
        trainer: Arc<dyn Trainer>,
        train: Arc<RecordBatch>,
        limit: Duration,
    ) -> Result<Execution, CandidateError> {
        let dir = self
            .acquire_dir(node)
            .map_err(|e| CandidateError::fault(format!("failed to create work directory: {e}")))?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let ctx = ExecutionContext {
            node,
            work_dir: dir.path().to_path_buf(),
            limit,
            cancelled: Arc::clone(&cancelled),
        };

        let started = Instant::now();
        let job = run_detached(format!("modelsmith-train-{node}"), limit, move || trainer.train(&ctx, &train));

        let outcome = match job.await {
            Err(JobFailure::TimedOut) => {
                cancelled.store(true, Ordering::SeqCst);
                warn!(node = %node, "candidate exceeded its execution limit");
                Err(CandidateError::timeout(limit))
            }
            Err(JobFailure::Panicked(message)) => {
                Err(CandidateError::fault(format!("training panicked: {message}")))
            }
            Err(JobFailure::Lost(message)) => Err(CandidateError::fault(message)),
            Ok(Err(error)) => Err(CandidateError::fault(format!("{error:#}"))),
            Ok(Ok(model)) => capture_files(dir.path())
                .map(|files| Execution {
                    model: Arc::from(model),
                    files,
                    duration: started.elapsed(),
                })
                .map_err(|e| CandidateError::fault(format!("failed to capture artifacts: {e}"))),
        };

        let dir_path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(node = %node, dir = %dir_path.display(), error = %e, "failed to remove work directory");
        } else {
            debug!(node = %node, "work directory released");
        }

        outcome
    }
}

/// Why a detached job produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum JobFailure {
    /// Did not finish within its limit; the thread is left running.
    TimedOut,
    /// Panicked; carries the panic message.
    Panicked(String),
    /// The worker thread could not be started or exited without a result.
    Lost(String),
}

/// Run `job` on a named thread that is never joined and wait at most `limit`.
///
/// Unlike the runtime's blocking pool, an abandoned job here does not delay
/// runtime shutdown.
pub(crate) async fn run_detached<T, F>(name: String, limit: Duration, job: F) -> Result<T, JobFailure>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let _worker = std::thread::Builder::new()
        .name(name)
        .spawn(move || {
            // The receiver is gone once the wait timed out.
            let _ = tx.send(catch_unwind(AssertUnwindSafe(job)));
        })
        .map_err(|e| JobFailure::Lost(format!("failed to start worker thread: {e}")))?;

    match tokio::time::timeout(limit, rx).await {
        Err(_) => Err(JobFailure::TimedOut),
        Ok(Err(_)) => Err(JobFailure::Lost("worker thread exited without a result".to_string())),
        Ok(Ok(Err(payload))) => Err(JobFailure::Panicked(panic_message(payload.as_ref()))),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}

/// Message of a panicked tokio task.
pub(crate) fn join_error_message(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    }
}

/// Human-readable panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Read every regular file under `root` into memory, keyed by relative path.
fn capture_files(root: &Path) -> std::io::Result<Vec<ArtifactFile>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() {
                let key = path
                    .strip_prefix(root)
                    .unwrap_or(&path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(ArtifactFile::new(key, std::fs::read(&path)?));
            }
        }
    }
    files.sort_by(|a, b| a.key().cmp(b.key()));
    Ok(files)
}
