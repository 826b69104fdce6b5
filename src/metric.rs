//! Metric - optimization target shared by the evaluator and the selector
//!
//! A metric is fixed for the duration of one build. It provides a total
//! order over succeeded nodes: better value first, ties broken by earlier
//! creation (first found wins).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Optimization direction of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Higher is better (accuracy, r2).
    Maximize,
    /// Lower is better (rmse, mae).
    Minimize,
}

/// Built-in metric computations understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Fraction of rounded predictions equal to the target label.
    Accuracy,
    /// Root mean squared error.
    Rmse,
    /// Mean squared error.
    Mse,
    /// Mean absolute error.
    Mae,
    /// Coefficient of determination.
    R2,
}

impl MetricKind {
    /// Parse a metric name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for names the evaluator cannot compute.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "accuracy" => Ok(Self::Accuracy),
            "rmse" => Ok(Self::Rmse),
            "mse" => Ok(Self::Mse),
            "mae" => Ok(Self::Mae),
            "r2" => Ok(Self::R2),
            other => Err(Error::InvalidConfig(format!(
                "unsupported metric '{other}' (expected accuracy, rmse, mse, mae or r2)"
            ))),
        }
    }

    /// Canonical lowercase name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::Rmse => "rmse",
            Self::Mse => "mse",
            Self::Mae => "mae",
            Self::R2 => "r2",
        }
    }

    /// Natural optimization direction for this metric.
    #[must_use]
    pub const fn default_direction(&self) -> Direction {
        match self {
            Self::Accuracy | Self::R2 => Direction::Maximize,
            Self::Rmse | Self::Mse | Self::Mae => Direction::Minimize,
        }
    }
}

/// Metric name and optimization direction.
///
/// # Example
///
/// ```rust
/// use modelsmith::metric::{Direction, Metric};
///
/// let metric = Metric::new("accuracy", Direction::Maximize);
/// assert!(metric.is_better(0.9, 0.8));
///
/// let metric = Metric::rmse();
/// assert!(metric.is_better(0.1, 0.2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    name: String,
    direction: Direction,
}

impl Metric {
    /// Create a metric with an explicit direction.
    #[must_use]
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
        }
    }

    /// Accuracy, maximized.
    #[must_use]
    pub fn accuracy() -> Self {
        Self::from_kind(MetricKind::Accuracy)
    }

    /// RMSE, minimized.
    #[must_use]
    pub fn rmse() -> Self {
        Self::from_kind(MetricKind::Rmse)
    }

    /// MAE, minimized.
    #[must_use]
    pub fn mae() -> Self {
        Self::from_kind(MetricKind::Mae)
    }

    /// R2, maximized.
    #[must_use]
    pub fn r2() -> Self {
        Self::from_kind(MetricKind::R2)
    }

    /// Metric for a built-in kind with its natural direction.
    #[must_use]
    pub fn from_kind(kind: MetricKind) -> Self {
        Self::new(kind.name(), kind.default_direction())
    }

    /// Get the metric name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the optimization direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Resolve the computation behind this metric's name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the name is not a built-in metric.
    pub fn kind(&self) -> Result<MetricKind> {
        MetricKind::parse(&self.name)
    }

    /// Compare two metric values; `Ordering::Less` means `a` is better.
    ///
    /// Non-finite values never reach this point (the evaluator rejects them),
    /// so incomparable pairs collapse to `Equal`.
    #[must_use]
    pub fn compare(&self, a: f64, b: f64) -> Ordering {
        let natural = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
        match self.direction {
            Direction::Maximize => natural.reverse(),
            Direction::Minimize => natural,
        }
    }

    /// Strictly better under this metric's direction.
    #[must_use]
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Whether `value` meets or beats `target`.
    #[must_use]
    pub fn reaches(&self, value: f64, target: f64) -> bool {
        self.compare(value, target) != Ordering::Greater
    }
}

impl Default for Metric {
    fn default() -> Self {
        Self::rmse()
    }
}
