//! Data managers and the data-manager context.
//!
//! A data manager owns a slice of simulation state and is the first
//! component to see every event affecting it. It subscribes to an event
//! type in one of three phases ([`EventPhase`]) and may register event
//! labelers so actors can subscribe to subsets of its events.
//!
//! Data managers are registered by plugins, at most one per concrete type,
//! and shared as `Rc<RefCell<T>>`. A data manager's own callbacks receive
//! `&mut Self` directly and must not look themselves up through
//! [`get_data_manager`](DataManagerContext::get_data_manager).

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use nucleus_core::{ActorId, ContractError, DataManagerId, Event, Key};

use crate::actor::Actor;
use crate::kernel::{EventCallback, Kernel, Task};
use crate::label::EventLabeler;
use crate::plan::{Owner, PlanInfo};
use crate::router::EventPhase;
use crate::view::SimulationView;

/// A component that owns simulation state.
pub trait DataManager: Sized + 'static {
    /// Called once, in plugin order, before any actor initializes.
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> Result<(), ContractError> {
        let _ = ctx;
        Ok(())
    }
}

/// Context handed to a data manager's initializer and callbacks.
pub struct DataManagerContext<'k, D> {
    kernel: &'k mut Kernel,
    id: DataManagerId,
    handle: Rc<RefCell<D>>,
}

impl<'k, D: DataManager> DataManagerContext<'k, D> {
    pub(crate) fn new(kernel: &'k mut Kernel, id: DataManagerId, handle: Rc<RefCell<D>>) -> Self {
        Self { kernel, id, handle }
    }

    fn owner(&self) -> Owner {
        Owner::DataManager(self.id)
    }

    fn task<F>(&self, f: F) -> Task
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let handle = Rc::clone(&self.handle);
        let id = self.id;
        Box::new(move |kernel: &mut Kernel| {
            let mut ctx = DataManagerContext::new(kernel, id, Rc::clone(&handle));
            let mut dm = handle.borrow_mut();
            f(&mut *dm, &mut ctx)
        })
    }

    fn callback<E, F>(&self, f: F) -> EventCallback
    where
        E: Event,
        F: Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> Result<(), ContractError> + 'static,
    {
        let handle = Rc::clone(&self.handle);
        let id = self.id;
        Rc::new(move |kernel: &mut Kernel, event: &dyn Any| {
            let Some(event) = event.downcast_ref::<E>() else {
                return Ok(());
            };
            let mut ctx = DataManagerContext::new(kernel, id, Rc::clone(&handle));
            let mut dm = handle.borrow_mut();
            f(&mut *dm, &mut ctx, event)
        })
    }

    /// This data manager's id.
    pub fn id(&self) -> DataManagerId {
        self.id
    }

    /// Current simulation time.
    pub fn time(&self) -> f64 {
        self.kernel.time()
    }

    /// Read-only view of the simulation.
    pub fn view(&self) -> SimulationView<'_> {
        SimulationView::new(&*self.kernel)
    }

    // ── plans ──────────────────────────────────────────────────

    /// Schedule an active plan at `time`.
    pub fn add_plan<F>(&mut self, time: f64, plan: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, None, true, task)
    }

    /// Schedule a passive plan. Passive plans never keep the simulation
    /// running.
    pub fn add_passive_plan<F>(&mut self, time: f64, plan: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, None, false, task)
    }

    /// Schedule an active plan retrievable by `key`.
    pub fn add_keyed_plan<F>(
        &mut self,
        time: f64,
        key: impl Into<Key>,
        plan: F,
    ) -> Result<(), ContractError>
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, Some(key.into()), true, task)
    }

    /// Schedule a passive plan retrievable by `key`.
    pub fn add_passive_keyed_plan<F>(
        &mut self,
        time: f64,
        key: impl Into<Key>,
        plan: F,
    ) -> Result<(), ContractError>
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, Some(key.into()), false, task)
    }

    /// This data manager's plan under `key`.
    pub fn get_plan(&self, key: &Key) -> Option<PlanInfo> {
        self.kernel.get_plan(self.owner(), key)
    }

    /// Scheduled time of this data manager's plan under `key`.
    pub fn get_plan_time(&self, key: &Key) -> Option<f64> {
        self.get_plan(key).map(|info| info.time)
    }

    /// Cancel this data manager's plan under `key`. Absent keys return
    /// `None`.
    pub fn remove_plan(&mut self, key: &Key) -> Option<PlanInfo> {
        let owner = self.owner();
        self.kernel.remove_plan(owner, key)
    }

    /// Keys of this data manager's queued plans, in insertion order.
    pub fn get_plan_keys(&self) -> Vec<Key> {
        self.kernel.plan_keys(self.owner())
    }

    // ── subscriptions ──────────────────────────────────────────

    /// Subscribe to `E` in `phase`. Subscribing again to the same phase
    /// replaces the callback.
    pub fn subscribe_to_event<E, F>(&mut self, phase: EventPhase, f: F)
    where
        E: Event,
        F: Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> Result<(), ContractError> + 'static,
    {
        let callback = self.callback::<E, F>(f);
        let id = self.id;
        self.kernel
            .router_mut()
            .subscribe_phase(TypeId::of::<E>(), phase, id, callback);
    }

    /// Subscribe to `E` ahead of every mutation.
    pub fn subscribe_to_event_validation_phase<E, F>(&mut self, f: F)
    where
        E: Event,
        F: Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> Result<(), ContractError> + 'static,
    {
        self.subscribe_to_event::<E, F>(EventPhase::Validation, f);
    }

    /// Subscribe to `E` to apply its mutation.
    pub fn subscribe_to_event_execution_phase<E, F>(&mut self, f: F)
    where
        E: Event,
        F: Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> Result<(), ContractError> + 'static,
    {
        self.subscribe_to_event::<E, F>(EventPhase::Execution, f);
    }

    /// Subscribe to `E` after every mutation has been applied.
    pub fn subscribe_to_event_post_phase<E, F>(&mut self, f: F)
    where
        E: Event,
        F: Fn(&mut D, &mut DataManagerContext<'_, D>, &E) -> Result<(), ContractError> + 'static,
    {
        self.subscribe_to_event::<E, F>(EventPhase::PostExecution, f);
    }

    /// Remove this data manager from every phase of `E`.
    pub fn unsubscribe_from_event<E: Event>(&mut self) {
        let id = self.id;
        self.kernel
            .router_mut()
            .unsubscribe_phases(TypeId::of::<E>(), id);
    }

    /// Register a labeler for `E`. Labeler ids are unique per simulation.
    pub fn add_event_labeler<E: Event>(&mut self, labeler: EventLabeler<E>) -> Result<(), ContractError> {
        let (id, erased) = labeler.into_erased();
        self.kernel
            .router_mut()
            .add_labeler(TypeId::of::<E>(), id, erased)
    }

    /// Run `f` once after the simulation stops, before any actor's close
    /// callback.
    pub fn subscribe_to_simulation_close<F>(&mut self, f: F)
    where
        F: FnOnce(&mut D, &mut DataManagerContext<'_, D>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(f));
        self.kernel.subscribe_to_close(owner, task);
    }

    /// Whether anything is subscribed to `E`.
    pub fn subscribers_exist<E: Event>(&self) -> bool {
        self.kernel.subscribers_exist::<E>()
    }

    /// Publish `event`. Subscribers run after the current unit of
    /// data-manager work, in phase order, followed by actor subscribers.
    pub fn resolve_event<E: Event>(&mut self, event: E) -> Result<(), ContractError> {
        self.kernel.resolve_event(event)
    }

    // ── components ─────────────────────────────────────────────

    /// Add an actor. It initializes as a later unit of actor work.
    pub fn add_actor<T: Actor>(&mut self, actor: T) -> ActorId {
        self.kernel.add_actor(actor)
    }

    /// Remove a live actor.
    pub fn remove_actor(&mut self, actor: ActorId) -> Result<(), ContractError> {
        self.kernel.remove_actor(actor)
    }

    /// Whether `actor` is live.
    pub fn actor_exists(&self, actor: ActorId) -> bool {
        self.kernel.actor_exists(actor)
    }

    /// Shared handle to another data manager.
    pub fn get_data_manager<T: DataManager>(&self) -> Result<Rc<RefCell<T>>, ContractError> {
        self.kernel.data_manager::<T>()
    }

    // ── run control ────────────────────────────────────────────

    /// Stop the simulation once the current unit of work and any queued
    /// work complete.
    pub fn halt(&mut self) {
        self.kernel.halt();
    }

    /// Hand `output` to the simulation's output consumer.
    pub fn release_output<O: Any>(&mut self, output: O) {
        self.kernel.release_output(output);
    }
}
