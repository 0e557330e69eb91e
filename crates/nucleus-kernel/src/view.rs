//! Read-only access to a running simulation.

use std::cell::RefCell;
use std::rc::Rc;

use nucleus_core::{ActorId, ContractError};

use crate::data_manager::DataManager;
use crate::kernel::Kernel;

/// Read-only view handed to event labelers.
///
/// Labelers may read data managers to compute a label but cannot schedule
/// work or publish events.
pub struct SimulationView<'a> {
    kernel: &'a Kernel,
}

impl<'a> SimulationView<'a> {
    pub(crate) fn new(kernel: &'a Kernel) -> Self {
        Self { kernel }
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.kernel.time()
    }

    /// Shared handle to the data manager of type `T`.
    pub fn get_data_manager<T: DataManager>(&self) -> Result<Rc<RefCell<T>>, ContractError> {
        self.kernel.data_manager::<T>()
    }

    /// Whether `actor` is live.
    pub fn actor_exists(&self, actor: ActorId) -> bool {
        self.kernel.actor_exists(actor)
    }
}
