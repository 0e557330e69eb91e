//! Experiment assembly and the scenario worker pool.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use nucleus_kernel::{Plugin, PluginDataBuilder, Simulation, SimulationConfig};
use tracing::{debug, info};

use crate::config::{ConfigError, ExperimentConfig};
use crate::context::{ExperimentContext, Subscribers};
use crate::dimension::{Dimension, DimensionContext};
use crate::error::{ExperimentError, ScenarioFailure};
use crate::scenario::{self, ScenarioRecord, ScenarioStatus};
use crate::state::ExperimentStateManager;

type ContextConsumer = Arc<dyn Fn(&mut ExperimentContext<'_>) + Send + Sync>;

/// A finished scenario and what the state manager made of it.
type Completion = (usize, std::io::Result<Option<ScenarioFailure>>);

/// A scenario's metadata and the plugin-data copies its levels edited.
type Levels = (Vec<String>, Vec<Box<dyn PluginDataBuilder>>);

// ── ExperimentSummary ──────────────────────────────────────────────

/// Outcome of [`Experiment::execute`].
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentSummary {
    /// Every scenario, indexed by scenario id.
    pub records: Vec<ScenarioRecord>,
    /// Scenarios that ran and succeeded.
    pub succeeded: usize,
    /// Scenarios skipped because a progress log recorded them.
    pub previously_succeeded: usize,
    /// Scenarios that failed.
    pub failed: usize,
}

impl ExperimentSummary {
    fn new(records: Vec<ScenarioRecord>) -> Self {
        let count = |status| records.iter().filter(|r| r.status == status).count();
        let succeeded = count(ScenarioStatus::Succeeded);
        let previously_succeeded = count(ScenarioStatus::PreviouslySucceeded);
        let failed = count(ScenarioStatus::Failed);
        Self {
            records,
            succeeded,
            previously_succeeded,
            failed,
        }
    }

    /// Total number of scenarios.
    pub fn scenario_count(&self) -> usize {
        self.records.len()
    }
}

// ── ExperimentBuilder ──────────────────────────────────────────────

/// Builder for [`Experiment`].
#[derive(Default)]
pub struct ExperimentBuilder {
    config: ExperimentConfig,
    simulation: SimulationConfig,
    dimensions: Vec<Dimension>,
    plugins: Vec<Plugin>,
    consumers: Vec<ContextConsumer>,
}

impl ExperimentBuilder {
    /// Add an axis of variation.
    #[must_use]
    pub fn add_dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    /// Contribute a plugin to every scenario.
    #[must_use]
    pub fn add_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Register experiment-level subscriptions. `consumer` runs once per
    /// [`Experiment::execute`].
    #[must_use]
    pub fn add_experiment_context_consumer<F>(mut self, consumer: F) -> Self
    where
        F: Fn(&mut ExperimentContext<'_>) + Send + Sync + 'static,
    {
        self.consumers.push(Arc::new(consumer));
        self
    }

    /// Replace the experiment configuration.
    #[must_use]
    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Base configuration for every scenario's simulation. The scenario id
    /// is filled in per scenario.
    #[must_use]
    pub fn simulation_config(mut self, config: SimulationConfig) -> Self {
        self.simulation = config;
        self
    }

    /// Worker threads; `0` runs scenarios on the calling thread.
    #[must_use]
    pub fn thread_count(mut self, threads: usize) -> Self {
        self.config.thread_count = threads;
        self
    }

    /// Write successes to a progress log at `path`.
    #[must_use]
    pub fn progress_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.progress_log = Some(path.into());
        self
    }

    /// Skip scenarios recorded as succeeded by a matching progress log.
    #[must_use]
    pub fn continue_from_progress_log(mut self, resume: bool) -> Self {
        self.config.continue_from_progress_log = resume;
        self
    }

    /// Validate and freeze the experiment.
    pub fn build(self) -> Result<Experiment, ExperimentError> {
        self.config.validate()?;
        self.simulation
            .validate()
            .map_err(ConfigError::Simulation)?;
        if let Some(dimension) = self.dimensions.iter().position(|d| d.level_count() == 0) {
            return Err(ConfigError::EmptyDimension { dimension }.into());
        }
        let sizes: Vec<usize> = self.dimensions.iter().map(Dimension::level_count).collect();
        let scenario_count =
            scenario::scenario_count(&sizes).ok_or(ConfigError::ScenarioCountOverflow)?;
        let metadata = self
            .dimensions
            .iter()
            .flat_map(|d| d.metadata().iter().cloned())
            .collect();
        Ok(Experiment {
            config: self.config,
            simulation: self.simulation,
            dimensions: self.dimensions,
            plugins: self.plugins,
            consumers: self.consumers,
            sizes,
            scenario_count,
            metadata,
        })
    }
}

// ── Experiment ─────────────────────────────────────────────────────

/// A set of scenarios spanned by the cross product of its dimensions.
///
/// Every scenario runs as an independent [`Simulation`] built from copies
/// of the experiment's plugins, with plugin data edited by that scenario's
/// dimension levels.
pub struct Experiment {
    config: ExperimentConfig,
    simulation: SimulationConfig,
    dimensions: Vec<Dimension>,
    plugins: Vec<Plugin>,
    consumers: Vec<ContextConsumer>,
    sizes: Vec<usize>,
    scenario_count: usize,
    metadata: Vec<String>,
}

impl Experiment {
    /// Start building an experiment.
    pub fn builder() -> ExperimentBuilder {
        ExperimentBuilder::default()
    }

    /// Number of scenarios.
    pub fn scenario_count(&self) -> usize {
        self.scenario_count
    }

    /// Metadata column names, dimension by dimension.
    pub fn experiment_metadata(&self) -> &[String] {
        &self.metadata
    }

    /// The experiment configuration.
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Run every pending scenario.
    ///
    /// Scenario failures are recorded, not returned, unless
    /// `halt_on_failure` is set. Progress-log I/O and worker-pool
    /// breakdowns abort the experiment.
    pub fn execute(&self) -> Result<ExperimentSummary, ExperimentError> {
        let mut subscribers = Subscribers::default();
        for consumer in &self.consumers {
            consumer(&mut ExperimentContext::new(&mut subscribers));
        }
        let state = Arc::new(ExperimentStateManager::open(
            &self.config,
            self.metadata.clone(),
            self.scenario_count,
            subscribers,
            |scenario| self.current_metadata(scenario),
        )?);

        let pending = state.pending();
        let threads = self.config.resolved_thread_count();
        info!(
            scenarios = self.scenario_count,
            pending = pending.len(),
            threads,
            "experiment starting"
        );
        let outcome = if threads == 0 {
            self.run_sequential(&state, pending)
        } else {
            self.run_pooled(&state, pending, threads)
        };
        let closed = state.close();
        outcome?;

        let summary = ExperimentSummary::new(closed?);
        info!(
            succeeded = summary.succeeded,
            previously_succeeded = summary.previously_succeeded,
            failed = summary.failed,
            "experiment closed"
        );
        Ok(summary)
    }

    fn run_sequential(
        &self,
        state: &Arc<ExperimentStateManager>,
        pending: Vec<usize>,
    ) -> Result<(), ExperimentError> {
        for scenario in pending {
            let result = self.run_scenario(state, scenario);
            self.settle(scenario, result)?;
        }
        Ok(())
    }

    /// Fixed-size pool fed one job per completion.
    fn run_pooled(
        &self,
        state: &Arc<ExperimentStateManager>,
        pending: Vec<usize>,
        threads: usize,
    ) -> Result<(), ExperimentError> {
        let threads = threads.min(pending.len());
        if threads == 0 {
            return Ok(());
        }
        let (job_tx, job_rx) = crossbeam_channel::bounded::<usize>(threads);
        let (done_tx, done_rx) = crossbeam_channel::unbounded::<Completion>();

        thread::scope(|scope| {
            let job_tx = job_tx;
            let mut workers = Vec::with_capacity(threads);
            for i in 0..threads {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("nucleus-scenario-{i}"))
                    .spawn_scoped(scope, move || {
                        for scenario in job_rx {
                            let result = self.run_scenario(state, scenario);
                            if done_tx.send((scenario, result)).is_err() {
                                break;
                            }
                        }
                    });
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        return Err(ExperimentError::WorkerPool {
                            reason: format!("failed to spawn scenario worker {i}: {e}"),
                        });
                    }
                }
            }
            drop(done_tx);

            let outcome = self.dispatch(&job_tx, &done_rx, pending, threads);
            drop(job_tx);
            let lost = workers.into_iter().filter_map(|w| w.join().err()).count();
            outcome?;
            if lost > 0 {
                return Err(ExperimentError::WorkerPool {
                    reason: format!("{lost} scenario worker(s) panicked"),
                });
            }
            Ok(())
        })
    }

    /// Keep `in_flight` jobs queued, submitting the next pending scenario
    /// as each one completes.
    fn dispatch(
        &self,
        jobs: &Sender<usize>,
        done: &Receiver<Completion>,
        pending: Vec<usize>,
        in_flight: usize,
    ) -> Result<(), ExperimentError> {
        let submit = |scenario: usize| {
            jobs.send(scenario).map_err(|_| ExperimentError::WorkerPool {
                reason: "every scenario worker exited".into(),
            })
        };
        let mut queue = pending.into_iter();
        let mut outstanding = 0usize;
        for scenario in queue.by_ref().take(in_flight) {
            submit(scenario)?;
            outstanding += 1;
        }
        while outstanding > 0 {
            let (scenario, result) = done.recv().map_err(|_| ExperimentError::WorkerPool {
                reason: "every scenario worker exited".into(),
            })?;
            outstanding -= 1;
            self.settle(scenario, result)?;
            if let Some(next) = queue.next() {
                submit(next)?;
                outstanding += 1;
            }
        }
        Ok(())
    }

    fn settle(
        &self,
        scenario: usize,
        result: std::io::Result<Option<ScenarioFailure>>,
    ) -> Result<(), ExperimentError> {
        match result? {
            Some(failure) if self.config.halt_on_failure => {
                Err(ExperimentError::ScenarioFailed { scenario, failure })
            }
            _ => Ok(()),
        }
    }

    /// Run one scenario to a terminal status. Errors and panics are
    /// recorded as failures.
    fn run_scenario(
        &self,
        state: &Arc<ExperimentStateManager>,
        scenario: usize,
    ) -> std::io::Result<Option<ScenarioFailure>> {
        state.dispatch(scenario);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.simulate(state, scenario)))
            .unwrap_or_else(|payload| {
                Err(ScenarioFailure::Panicked {
                    message: panic_message(&*payload),
                })
            });
        state.finish(scenario, outcome)
    }

    fn simulate(
        &self,
        state: &Arc<ExperimentStateManager>,
        scenario: usize,
    ) -> Result<(), ScenarioFailure> {
        let levels = scenario::decode_scenario(scenario, &self.sizes);
        let (metadata, plugins) = self.prepare(&levels)?;
        state.start(scenario, metadata);

        let sink = Arc::clone(state);
        let config = SimulationConfig {
            scenario_id: Some(scenario),
            ..self.simulation.clone()
        };
        let summary = plugins
            .into_iter()
            .fold(Simulation::builder().config(config), |b, p| b.add_plugin(p))
            .output_consumer(move |output: Box<dyn Any>| sink.release_output(scenario, &*output))
            .build()?
            .execute()?;
        debug!(
            scenario,
            end_time = summary.end_time,
            plans_executed = summary.plans_executed,
            "scenario simulated"
        );
        Ok(())
    }

    /// Metadata the levels of `scenario` produce, or `None` when they fail
    /// or panic.
    fn current_metadata(&self, scenario: usize) -> Option<Vec<String>> {
        let levels = scenario::decode_scenario(scenario, &self.sizes);
        panic::catch_unwind(AssertUnwindSafe(|| self.apply_levels(&levels)))
            .ok()?
            .ok()
            .map(|(metadata, _)| metadata)
    }

    /// Apply one level per dimension to copies of the plugin data and
    /// rebuild the plugins around the edited copies.
    fn prepare(&self, levels: &[usize]) -> Result<(Vec<String>, Vec<Plugin>), ScenarioFailure> {
        let (metadata, builders) = self.apply_levels(levels)?;
        let mut rebuilt = builders.iter().map(|b| b.build());
        let plugins = self
            .plugins
            .iter()
            .map(|p| p.with_data(rebuilt.by_ref().take(p.data().len()).collect()))
            .collect();
        Ok((metadata, plugins))
    }

    fn apply_levels(&self, levels: &[usize]) -> Result<Levels, ScenarioFailure> {
        let mut builders: Vec<_> = self
            .plugins
            .iter()
            .flat_map(|p| p.data().iter().map(|d| d.to_builder()))
            .collect();

        let mut metadata = Vec::with_capacity(self.metadata.len());
        let mut ctx = DimensionContext::new(&mut builders);
        for (index, (dimension, &level)) in self.dimensions.iter().zip(levels).enumerate() {
            let values = dimension.apply(level, &mut ctx);
            if values.len() != dimension.metadata().len() {
                return Err(ScenarioFailure::LevelMetadata {
                    dimension: index,
                    expected: dimension.metadata().len(),
                    found: values.len(),
                });
            }
            metadata.extend(values);
        }
        Ok((metadata, builders))
    }
}

impl std::fmt::Debug for Experiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Experiment")
            .field("config", &self.config)
            .field("dimensions", &self.dimensions)
            .field("plugins", &self.plugins)
            .field("scenario_count", &self.scenario_count)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
