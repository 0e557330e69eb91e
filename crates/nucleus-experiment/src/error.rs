//! Experiment-level and per-scenario error types.

use std::error::Error;
use std::fmt;
use std::io;

use nucleus_core::ContractError;

use crate::config::ConfigError;

// ── ScenarioFailure ────────────────────────────────────────────────

/// Why one scenario ended FAILED.
///
/// Failures are isolated: sibling scenarios still run.
#[derive(Clone, Debug, PartialEq)]
pub enum ScenarioFailure {
    /// The kernel rejected a contract violation.
    Contract(ContractError),
    /// A plugin, data manager, actor, or level function panicked.
    Panicked {
        /// The panic message, when it was a string.
        message: String,
    },
    /// A level function returned the wrong number of metadata values.
    LevelMetadata {
        /// Index of the offending dimension.
        dimension: usize,
        /// Columns the dimension declares.
        expected: usize,
        /// Values the level returned.
        found: usize,
    },
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contract(e) => write!(f, "{e}"),
            Self::Panicked { message } => write!(f, "panicked: {message}"),
            Self::LevelMetadata {
                dimension,
                expected,
                found,
            } => write!(
                f,
                "dimension {dimension} level returned {found} metadata values, expected {expected}"
            ),
        }
    }
}

impl Error for ScenarioFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Contract(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ContractError> for ScenarioFailure {
    fn from(e: ContractError) -> Self {
        Self::Contract(e)
    }
}

// ── ExperimentError ────────────────────────────────────────────────

/// Errors that abort a whole experiment.
#[derive(Debug)]
pub enum ExperimentError {
    /// The experiment was misconfigured.
    Config(ConfigError),
    /// The progress log could not be read or written.
    Io(io::Error),
    /// The worker pool broke down (spawn failure, lost worker).
    WorkerPool {
        /// Description of the breakdown.
        reason: String,
    },
    /// A scenario failed while `halt_on_failure` was set.
    ScenarioFailed {
        /// The failed scenario.
        scenario: usize,
        /// Why it failed.
        failure: ScenarioFailure,
    },
}

impl fmt::Display for ExperimentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "invalid experiment: {e}"),
            Self::Io(e) => write!(f, "progress log: {e}"),
            Self::WorkerPool { reason } => write!(f, "worker pool failure: {reason}"),
            Self::ScenarioFailed { scenario, failure } => {
                write!(f, "scenario {scenario} failed: {failure}")
            }
        }
    }
}

impl Error for ExperimentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::ScenarioFailed { failure, .. } => Some(failure),
            Self::WorkerPool { .. } => None,
        }
    }
}

impl From<ConfigError> for ExperimentError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<io::Error> for ExperimentError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
