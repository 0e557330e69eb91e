//! Experiment-level lifecycle subscriptions.
//!
//! Consumers registered with
//! [`ExperimentBuilder::add_experiment_context_consumer`](crate::ExperimentBuilder::add_experiment_context_consumer)
//! receive an [`ExperimentContext`] once per execution and subscribe to
//! experiment open/close, per-scenario open/close, and typed outputs.
//! Every callback runs under the experiment state lock, from whichever
//! thread produced the notification, with a read-only [`ExperimentView`].

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::scenario::{ScenarioRecord, ScenarioStatus};

type ExperimentCallback = Box<dyn FnMut(&ExperimentView<'_>) + Send>;
type ScenarioCallback = Box<dyn FnMut(&ExperimentView<'_>, usize) + Send>;
type ScenarioCloseCallback = Box<dyn FnMut(&ExperimentView<'_>, usize, ScenarioStatus) + Send>;
type OutputCallback = Box<dyn FnMut(&ExperimentView<'_>, usize, &dyn Any) + Send>;

#[derive(Default)]
pub(crate) struct Subscribers {
    pub(crate) experiment_open: Vec<ExperimentCallback>,
    pub(crate) experiment_close: Vec<ExperimentCallback>,
    pub(crate) simulation_open: Vec<ScenarioCallback>,
    pub(crate) simulation_close: Vec<ScenarioCloseCallback>,
    pub(crate) outputs: HashMap<TypeId, Vec<OutputCallback>>,
}

/// Registration handle for experiment-level subscriptions.
pub struct ExperimentContext<'a> {
    subscribers: &'a mut Subscribers,
}

impl<'a> ExperimentContext<'a> {
    pub(crate) fn new(subscribers: &'a mut Subscribers) -> Self {
        Self { subscribers }
    }

    /// Called once before any scenario runs.
    pub fn subscribe_to_experiment_open<F>(&mut self, f: F)
    where
        F: FnMut(&ExperimentView<'_>) + Send + 'static,
    {
        self.subscribers.experiment_open.push(Box::new(f));
    }

    /// Called once after every scenario has finished.
    pub fn subscribe_to_experiment_close<F>(&mut self, f: F)
    where
        F: FnMut(&ExperimentView<'_>) + Send + 'static,
    {
        self.subscribers.experiment_close.push(Box::new(f));
    }

    /// Called when a scenario starts running, with its id.
    pub fn subscribe_to_simulation_open<F>(&mut self, f: F)
    where
        F: FnMut(&ExperimentView<'_>, usize) + Send + 'static,
    {
        self.subscribers.simulation_open.push(Box::new(f));
    }

    /// Called when a started scenario reaches a terminal status.
    pub fn subscribe_to_simulation_close<F>(&mut self, f: F)
    where
        F: FnMut(&ExperimentView<'_>, usize, ScenarioStatus) + Send + 'static,
    {
        self.subscribers.simulation_close.push(Box::new(f));
    }

    /// Called for every output of type `T` released by any scenario.
    pub fn subscribe_to_output<T, F>(&mut self, mut f: F)
    where
        T: Any,
        F: FnMut(&ExperimentView<'_>, usize, &T) + Send + 'static,
    {
        let callback: OutputCallback = Box::new(move |view, scenario, output| {
            if let Some(output) = output.downcast_ref::<T>() {
                f(view, scenario, output);
            }
        });
        self.subscribers
            .outputs
            .entry(TypeId::of::<T>())
            .or_default()
            .push(callback);
    }
}

/// Read-only view of experiment state.
pub struct ExperimentView<'a> {
    records: &'a [ScenarioRecord],
    metadata: &'a [String],
}

impl<'a> ExperimentView<'a> {
    pub(crate) fn new(records: &'a [ScenarioRecord], metadata: &'a [String]) -> Self {
        Self { records, metadata }
    }

    /// Total number of scenarios.
    pub fn scenario_count(&self) -> usize {
        self.records.len()
    }

    /// Current status of `scenario`.
    pub fn status(&self, scenario: usize) -> Option<ScenarioStatus> {
        self.records.get(scenario).map(|r| r.status)
    }

    /// Metadata values of `scenario`. Empty until its levels are applied.
    pub fn scenario_metadata(&self, scenario: usize) -> Option<&'a [String]> {
        self.records.get(scenario).map(|r| r.metadata.as_slice())
    }

    /// Metadata column names, dimension by dimension.
    pub fn experiment_metadata(&self) -> &'a [String] {
        self.metadata
    }
}
