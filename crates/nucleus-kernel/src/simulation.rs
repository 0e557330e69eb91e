//! The public entry point: build a simulation from plugins and run it.

use std::any::Any;
use std::fmt;

use nucleus_core::ContractError;

use crate::config::SimulationConfig;
use crate::kernel::{Kernel, OutputConsumer};
use crate::plugin::Plugin;
use crate::resolver;

/// Why the execution loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// A component called `halt()`.
    Requested,
    /// No active plans remained.
    NoActivePlans,
    /// The next plan was scheduled after the configured halt time.
    HaltTime,
}

/// Outcome of a completed [`Simulation::execute`].
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSummary {
    /// Time at which plugins were initialized.
    pub start_time: f64,
    /// Time of the last executed plan.
    pub end_time: f64,
    /// Number of plans dispatched.
    pub plans_executed: u64,
    /// Why the run stopped.
    pub halted_by: HaltReason,
}

/// Builder for [`Simulation`].
#[derive(Default)]
pub struct SimulationBuilder {
    config: SimulationConfig,
    plugins: Vec<Plugin>,
    output: Option<OutputConsumer>,
}

impl SimulationBuilder {
    /// Contribute a plugin.
    #[must_use]
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Replace the configuration.
    #[must_use]
    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive every output released by a data manager or actor.
    #[must_use]
    pub fn output_consumer<F>(mut self, consumer: F) -> Self
    where
        F: FnMut(Box<dyn Any>) + 'static,
    {
        self.output = Some(Box::new(consumer));
        self
    }

    /// Validate the configuration and resolve the plugin order.
    pub fn build(self) -> Result<Simulation, ContractError> {
        self.config.validate()?;
        let plugins = resolver::resolve(self.plugins)?;
        Ok(Simulation {
            kernel: Kernel::new(&self.config, self.output),
            plugins,
            halt_time: self.config.halt_time,
        })
    }
}

/// A single-threaded discrete-event simulation.
///
/// Built once, executed once.
pub struct Simulation {
    kernel: Kernel,
    plugins: Vec<Plugin>,
    halt_time: Option<f64>,
}

impl Simulation {
    /// Start building a simulation.
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::default()
    }

    /// Plugins in initialization order.
    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    /// Initialize every plugin and run until halted.
    ///
    /// A second call fails with
    /// [`ErrorKind::RepeatedExecution`](nucleus_core::ErrorKind::RepeatedExecution).
    pub fn execute(&mut self) -> Result<SimulationSummary, ContractError> {
        self.kernel.execute(&self.plugins, self.halt_time)
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("plugins", &self.plugins)
            .field("halt_time", &self.halt_time)
            .finish_non_exhaustive()
    }
}
