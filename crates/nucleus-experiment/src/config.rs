//! Experiment configuration, validation, and configuration errors.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;

use nucleus_core::ContractError;

/// Upper bound applied by [`ExperimentConfig::resolved_thread_count`].
pub const MAX_THREADS: usize = 256;

// ── ExperimentConfig ───────────────────────────────────────────────

/// Configuration for an [`Experiment`](crate::Experiment).
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentConfig {
    /// Worker threads. `0` runs every scenario on the calling thread.
    /// Default: 0.
    pub thread_count: usize,
    /// Path of the tab-delimited progress log. `None` = no log.
    pub progress_log: Option<PathBuf>,
    /// Skip scenarios that a matching progress log records as succeeded.
    /// Requires `progress_log`. Default: false.
    pub continue_from_progress_log: bool,
    /// Stop dispatching scenarios after the first failure and return it as
    /// an error. Default: false.
    pub halt_on_failure: bool,
    /// Log `completed/total` after every scenario. Default: false.
    pub report_progress: bool,
    /// Log every scenario failure. Default: true.
    pub report_failures: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            thread_count: 0,
            progress_log: None,
            continue_from_progress_log: false,
            halt_on_failure: false,
            report_progress: false,
            report_failures: true,
        }
    }
}

impl ExperimentConfig {
    /// Worker thread count, clamped to `[0, MAX_THREADS]`.
    pub fn resolved_thread_count(&self) -> usize {
        self.thread_count.min(MAX_THREADS)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.continue_from_progress_log && self.progress_log.is_none() {
            return Err(ConfigError::MissingProgressLog);
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while building an [`Experiment`](crate::Experiment).
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigError {
    /// The base simulation configuration is invalid.
    Simulation(ContractError),
    /// Resuming was requested without a progress log path.
    MissingProgressLog,
    /// A dimension declares no levels.
    EmptyDimension {
        /// Index of the dimension in registration order.
        dimension: usize,
    },
    /// The product of the dimension sizes does not fit in `usize`.
    ScenarioCountOverflow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulation(e) => write!(f, "simulation config: {e}"),
            Self::MissingProgressLog => {
                write!(f, "continue_from_progress_log requires a progress_log path")
            }
            Self::EmptyDimension { dimension } => {
                write!(f, "dimension {dimension} has no levels")
            }
            Self::ScenarioCountOverflow => write!(f, "scenario count overflows usize"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Simulation(e) => Some(e),
            _ => None,
        }
    }
}
