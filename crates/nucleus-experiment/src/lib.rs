//! Experiment runner for the Nucleus simulation kernel.
//!
//! An [`Experiment`] spans the cross product of its [`Dimension`]s. Each
//! combination of levels is one scenario, decoded from its id in mixed
//! radix with dimension 0 least significant. A scenario runs as an
//! independent [`Simulation`](nucleus_kernel::Simulation) whose plugin data
//! has been edited by the scenario's levels.
//!
//! Scenarios run sequentially (`thread_count == 0`) or on a fixed-size
//! worker pool. A failing or panicking scenario is recorded as
//! [`ScenarioStatus::Failed`] without affecting its siblings. Successes can
//! be written to a tab-delimited progress log so an interrupted experiment
//! resumes where it stopped.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod dimension;
pub mod error;
pub mod experiment;
mod progress;
pub mod scenario;
mod state;

pub use config::{ConfigError, ExperimentConfig};
pub use context::{ExperimentContext, ExperimentView};
pub use dimension::{Dimension, DimensionBuilder, DimensionContext};
pub use error::{ExperimentError, ScenarioFailure};
pub use experiment::{Experiment, ExperimentBuilder, ExperimentSummary};
pub use scenario::{ScenarioRecord, ScenarioStatus};
