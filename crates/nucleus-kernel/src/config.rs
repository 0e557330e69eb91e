//! Simulation configuration and validation.

use nucleus_core::{ContractError, ErrorKind};

// ── SimulationConfig ───────────────────────────────────────────────

/// Configuration for one [`Simulation`](crate::simulation::Simulation) run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Simulation time at which plugin initialization happens. Default: 0.0.
    pub start_time: f64,
    /// Plans scheduled after this time are never executed. `None` = run
    /// until no active plans remain or `halt()` is called.
    pub halt_time: Option<f64>,
    /// Experiment scenario this run belongs to, if any. Only used to tag
    /// log records.
    pub scenario_id: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            halt_time: None,
            scenario_id: None,
        }
    }
}

impl SimulationConfig {
    /// Check structural invariants.
    ///
    /// `start_time` must be finite. `halt_time`, when set, must be finite
    /// and not before `start_time`.
    pub fn validate(&self) -> Result<(), ContractError> {
        if !self.start_time.is_finite() {
            return Err(ErrorKind::InvalidStartTime {
                value: self.start_time,
            }
            .into());
        }
        if let Some(halt) = self.halt_time {
            if !halt.is_finite() || halt < self.start_time {
                return Err(ErrorKind::InvalidHaltTime { value: halt }.into());
            }
        }
        Ok(())
    }
}
