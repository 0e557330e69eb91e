//! Shared experiment state.
//!
//! The scenario table, the progress log writer, and the experiment-level
//! subscribers sit behind one mutex. Workers report through it; nothing
//! else is shared between scenario threads.

use std::any::Any;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::context::{ExperimentView, Subscribers};
use crate::error::ScenarioFailure;
use crate::progress::{self, ProgressLog, Recovered};
use crate::scenario::{ScenarioRecord, ScenarioStatus};

struct StateInner {
    records: Vec<ScenarioRecord>,
    metadata: Vec<String>,
    progress: Option<ProgressLog>,
    subscribers: Subscribers,
    /// Scenarios whose simulation-open subscribers have run.
    opened: Vec<bool>,
    finished: usize,
    report_progress: bool,
    report_failures: bool,
}

pub(crate) struct ExperimentStateManager {
    inner: Mutex<StateInner>,
}

impl ExperimentStateManager {
    /// Build the scenario table, recover and rewrite the progress log, and
    /// notify experiment-open subscribers.
    ///
    /// `current` yields a scenario's metadata under the experiment's
    /// present levels, and a recovered row must agree with it.
    pub(crate) fn open<F>(
        config: &ExperimentConfig,
        metadata: Vec<String>,
        scenario_count: usize,
        subscribers: Subscribers,
        current: F,
    ) -> io::Result<Self>
    where
        F: Fn(usize) -> Option<Vec<String>>,
    {
        let recovered = match &config.progress_log {
            Some(path) if config.continue_from_progress_log => {
                progress::recover(path, &metadata, scenario_count, current)?
            }
            _ => Recovered::new(),
        };
        let mut records = vec![ScenarioRecord::ready(); scenario_count];
        for (&scenario, values) in &recovered {
            if let Some(record) = records.get_mut(scenario) {
                record.status = ScenarioStatus::PreviouslySucceeded;
                record.metadata = values.clone();
            }
        }
        let progress = config
            .progress_log
            .as_deref()
            .map(|path| ProgressLog::create(path, &metadata, &recovered))
            .transpose()?;

        info!(
            scenarios = scenario_count,
            recovered = recovered.len(),
            "experiment open"
        );
        let mut inner = StateInner {
            records,
            metadata,
            progress,
            subscribers,
            opened: vec![false; scenario_count],
            finished: recovered.len(),
            report_progress: config.report_progress,
            report_failures: config.report_failures,
        };
        let StateInner {
            records,
            metadata,
            subscribers,
            ..
        } = &mut inner;
        let view = ExperimentView::new(records, metadata);
        for callback in &mut subscribers.experiment_open {
            callback(&view);
        }
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, StateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scenarios still waiting to run, in id order.
    pub(crate) fn pending(&self) -> Vec<usize> {
        self.lock()
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ScenarioStatus::Ready)
            .map(|(id, _)| id)
            .collect()
    }

    /// Mark `scenario` running as it is handed to a worker.
    pub(crate) fn dispatch(&self, scenario: usize) {
        if let Some(record) = self.lock().records.get_mut(scenario) {
            record.status = ScenarioStatus::Running;
        }
    }

    /// Record the metadata of a running scenario whose levels applied
    /// cleanly and notify simulation-open subscribers.
    pub(crate) fn start(&self, scenario: usize, metadata: Vec<String>) {
        let mut guard = self.lock();
        let StateInner {
            records,
            metadata: columns,
            subscribers,
            opened,
            ..
        } = &mut *guard;
        if let Some(record) = records.get_mut(scenario) {
            record.metadata = metadata;
        }
        if let Some(flag) = opened.get_mut(scenario) {
            *flag = true;
        }
        let view = ExperimentView::new(records, columns);
        for callback in &mut subscribers.simulation_open {
            callback(&view, scenario);
        }
    }

    /// Dispatch one output released by `scenario`.
    pub(crate) fn release_output(&self, scenario: usize, output: &dyn Any) {
        let mut guard = self.lock();
        let StateInner {
            records,
            metadata,
            subscribers,
            ..
        } = &mut *guard;
        let Some(callbacks) = subscribers.outputs.get_mut(&(*output).type_id()) else {
            return;
        };
        let view = ExperimentView::new(records, metadata);
        for callback in callbacks {
            callback(&view, scenario, output);
        }
    }

    /// Record the terminal status of `scenario`.
    ///
    /// Successes are appended to the progress log. Returns the failure, if
    /// any, for the dispatcher.
    pub(crate) fn finish(
        &self,
        scenario: usize,
        outcome: Result<(), ScenarioFailure>,
    ) -> io::Result<Option<ScenarioFailure>> {
        let mut guard = self.lock();
        let StateInner {
            records,
            metadata,
            progress,
            subscribers,
            opened,
            finished,
            report_progress,
            report_failures,
        } = &mut *guard;
        let Some(record) = records.get_mut(scenario) else {
            return Ok(outcome.err());
        };
        let was_opened = opened.get(scenario).copied().unwrap_or(false);
        let failure = match outcome {
            Ok(()) => {
                record.status = ScenarioStatus::Succeeded;
                if let Some(log) = progress.as_mut() {
                    log.append(scenario, &record.metadata)?;
                }
                None
            }
            Err(failure) => {
                if *report_failures {
                    warn!(scenario, %failure, "scenario failed");
                }
                record.status = ScenarioStatus::Failed;
                record.failure = Some(failure.clone());
                Some(failure)
            }
        };
        let status = record.status;
        *finished += 1;
        if *report_progress {
            info!(scenario, ?status, "{}/{} scenarios complete", *finished, records.len());
        }

        if was_opened {
            let view = ExperimentView::new(records, metadata);
            for callback in &mut subscribers.simulation_close {
                callback(&view, scenario, status);
            }
        }
        Ok(failure)
    }

    /// Notify experiment-close subscribers, close the progress log, and
    /// hand back the final records.
    pub(crate) fn close(&self) -> io::Result<Vec<ScenarioRecord>> {
        let mut guard = self.lock();
        let StateInner {
            records,
            metadata,
            progress,
            subscribers,
            ..
        } = &mut *guard;
        let view = ExperimentView::new(records, metadata);
        for callback in &mut subscribers.experiment_close {
            callback(&view);
        }
        if let Some(log) = progress.take() {
            log.close()?;
        }
        Ok(records.clone())
    }

    #[cfg(test)]
    fn has_output_subscribers<T: Any>(&self) -> bool {
        self.lock()
            .subscribers
            .outputs
            .contains_key(&std::any::TypeId::of::<T>())
    }
}
