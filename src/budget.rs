//! Budget Manager: wall-clock and iteration limits for one build
//!
//! Time is measured from build start (a single `Instant`), never per call,
//! so many short iterations cannot drift past the deadline.
//! Capacity check and iteration consumption happen in one atomic step
//! ([`BudgetManager::try_acquire`]) so concurrent workers cannot both pass
//! the last slot.
//!
//! Toyota Way: Poka-Yoke (the deadline is fixed when the build starts)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation switch for an in-progress build.
///
/// Cloning shares the flag. Once cancelled, no new candidate starts;
/// in-flight candidates finish under their own timeout.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an un-cancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks remaining time and iterations for one build.
#[derive(Debug)]
pub struct BudgetManager {
    started: Instant,
    timeout: Option<Duration>,
    max_iterations: Option<u64>,
    consumed: AtomicU64,
    cancellation: CancellationFlag,
}

impl BudgetManager {
    /// Start the clock. `None` means unbounded in that dimension.
    #[must_use]
    pub fn new(timeout: Option<Duration>, max_iterations: Option<u64>) -> Self {
        Self::with_cancellation(timeout, max_iterations, CancellationFlag::new())
    }

    /// Start the clock with an external cancellation flag.
    #[must_use]
    pub fn with_cancellation(
        timeout: Option<Duration>,
        max_iterations: Option<u64>,
        cancellation: CancellationFlag,
    ) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            max_iterations,
            consumed: AtomicU64::new(0),
            cancellation,
        }
    }

    /// Whether neither dimension is bounded.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.timeout.is_none() && self.max_iterations.is_none()
    }

    /// Overall build timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Time since the build started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Remaining wall-clock time (`None` when unbounded).
    #[must_use]
    pub fn remaining_time(&self) -> Option<Duration> {
        self.timeout.map(|t| t.saturating_sub(self.elapsed()))
    }

    /// Remaining iterations (`None` when unbounded). Never negative.
    #[must_use]
    pub fn remaining_iterations(&self) -> Option<u64> {
        self.max_iterations
            .map(|max| max.saturating_sub(self.consumed.load(Ordering::SeqCst)))
    }

    /// Iterations consumed so far.
    #[must_use]
    pub fn iterations_consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Whether the build was cancelled externally.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    fn time_left(&self) -> bool {
        self.remaining_time().map_or(true, |d| !d.is_zero())
    }

    /// Whether a new candidate may start right now.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        !self.is_cancelled()
            && self.time_left()
            && self.remaining_iterations().map_or(true, |n| n > 0)
    }

    /// Record one started iteration (saturates at the limit).
    pub fn consume_iteration(&self) {
        let _ = self.try_acquire();
    }

    /// Atomically check capacity and consume one iteration.
    ///
    /// Returns `false` (consuming nothing) once either dimension is exhausted
    /// or the build is cancelled.
    pub fn try_acquire(&self) -> bool {
        if self.is_cancelled() || !self.time_left() {
            return false;
        }
        self.consumed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                match self.max_iterations {
                    Some(max) if used >= max => None,
                    _ => Some(used.saturating_add(1)),
                }
            })
            .is_ok()
    }

    /// Per-candidate limit: the configured limit, bounded by the time left
    /// in the build.
    #[must_use]
    pub fn candidate_limit(&self, configured: Duration) -> Duration {
        self.remaining_time().map_or(configured, |left| configured.min(left))
    }
}
