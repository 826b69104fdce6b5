//! Build configuration
//!
//! Tunables that stay fixed for one build. Durations are stored in
//! milliseconds so configs round-trip through JSON unchanged.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default per-candidate execution limit (5 minutes)
pub const DEFAULT_CANDIDATE_TIMEOUT_MS: u64 = 300_000;

/// Default fraction of rows reserved for holdout scoring
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;

/// Default failed refinements tolerated before abandoning a branch
pub const DEFAULT_REFINEMENT_RETRY_CEILING: usize = 3;

/// Default holdout rows scored per prediction call
pub const DEFAULT_SCORING_CHUNK_ROWS: usize = 65_536;

/// Tunables for one build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Per-candidate wall-clock limit; clamped to the overall build timeout.
    pub candidate_timeout_ms: u64,
    /// Fraction of rows reserved for holdout scoring, in (0, 1).
    pub holdout_fraction: f64,
    /// Seed of the train/holdout permutation.
    pub split_seed: u64,
    /// Failed refinements of a node before the search moves on from it.
    pub refinement_retry_ceiling: usize,
    /// Candidates executed concurrently under one parent.
    pub parallelism: usize,
    /// Stop as soon as a candidate reaches this metric value.
    pub target_metric: Option<f64>,
    /// Holdout rows passed to `predict` per call.
    pub scoring_chunk_rows: usize,
    /// Packages generated code may use (forwarded to the generator).
    pub allowed_packages: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            candidate_timeout_ms: DEFAULT_CANDIDATE_TIMEOUT_MS,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            split_seed: 42,
            refinement_retry_ceiling: DEFAULT_REFINEMENT_RETRY_CEILING,
            parallelism: 1,
            target_metric: None,
            scoring_chunk_rows: DEFAULT_SCORING_CHUNK_ROWS,
            allowed_packages: Vec::new(),
        }
    }
}

impl BuildConfig {
    /// Create a builder starting from defaults.
    #[must_use]
    pub fn builder() -> BuildConfigBuilder {
        BuildConfigBuilder::default()
    }

    /// Parse a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] on malformed JSON and
    /// [`Error::InvalidConfig`] if validation fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-candidate limit as a `Duration`.
    #[must_use]
    pub const fn candidate_timeout(&self) -> Duration {
        Duration::from_millis(self.candidate_timeout_ms)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "holdout_fraction must be in (0, 1), got {}",
                self.holdout_fraction
            )));
        }
        if self.candidate_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "candidate_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidConfig(
                "parallelism must be greater than 0".to_string(),
            ));
        }
        if self.scoring_chunk_rows == 0 {
            return Err(Error::InvalidConfig(
                "scoring_chunk_rows must be greater than 0".to_string(),
            ));
        }
        if let Some(target) = self.target_metric {
            if !target.is_finite() {
                return Err(Error::InvalidConfig(format!(
                    "target_metric must be finite, got {target}"
                )));
            }
        }
        Ok(())
    }
}

/// Builder for `BuildConfig`.
#[derive(Debug, Default)]
pub struct BuildConfigBuilder {
    config: BuildConfig,
}

impl BuildConfigBuilder {
    /// Set the per-candidate execution limit.
    #[must_use]
    pub fn candidate_timeout(mut self, timeout: Duration) -> Self {
        self.config.candidate_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the holdout fraction.
    #[must_use]
    pub const fn holdout_fraction(mut self, fraction: f64) -> Self {
        self.config.holdout_fraction = fraction;
        self
    }

    /// Set the split seed.
    #[must_use]
    pub const fn split_seed(mut self, seed: u64) -> Self {
        self.config.split_seed = seed;
        self
    }

    /// Set the refinement retry ceiling.
    #[must_use]
    pub const fn refinement_retry_ceiling(mut self, ceiling: usize) -> Self {
        self.config.refinement_retry_ceiling = ceiling;
        self
    }

    /// Set how many candidates run concurrently under one parent.
    #[must_use]
    pub const fn parallelism(mut self, workers: usize) -> Self {
        self.config.parallelism = workers;
        self
    }

    /// Stop once a candidate reaches `value`.
    #[must_use]
    pub const fn target_metric(mut self, value: f64) -> Self {
        self.config.target_metric = Some(value);
        self
    }

    /// Set holdout rows per prediction call.
    #[must_use]
    pub const fn scoring_chunk_rows(mut self, rows: usize) -> Self {
        self.config.scoring_chunk_rows = rows;
        self
    }

    /// Set the packages generated code may use.
    #[must_use]
    pub fn allowed_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Build and validate the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if validation fails.
    pub fn build(self) -> Result<BuildConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
