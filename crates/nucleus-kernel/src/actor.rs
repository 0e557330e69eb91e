//! Actors and the actor context.
//!
//! An actor observes events and plans future work. It never owns
//! engine-wide state: to change shared state an actor resolves an event
//! that a data manager applies, and by the time
//! [`resolve_event`](ActorContext::resolve_event) returns every
//! data-manager reaction has run.
//!
//! Actors are shared by the kernel as `Rc<RefCell<A>>`. Every callback an
//! actor registers receives `&mut A` plus a fresh [`ActorContext`] when it
//! is dispatched.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use nucleus_core::{ActorId, ContractError, Event, Key};

use crate::data_manager::DataManager;
use crate::kernel::{EventCallback, Kernel, Task};
use crate::label::{EventFilter, EventLabel};
use crate::plan::{Owner, PlanInfo};
use crate::view::SimulationView;

/// A schedulable component that observes events and plans work.
pub trait Actor: Sized + 'static {
    /// Called once, as the first unit of work for this actor.
    fn init(&mut self, ctx: &mut ActorContext<'_, Self>) -> Result<(), ContractError>;
}

type ActorInit = Box<dyn FnOnce(&mut ActorContext<'_, ClosureActor>) -> Result<(), ContractError>>;

/// An actor defined by its initializer alone.
///
/// Useful when an actor keeps its state in the closures it registers.
pub struct ClosureActor {
    init: Option<ActorInit>,
}

impl ClosureActor {
    /// Wrap `init`.
    pub fn new<F>(init: F) -> Self
    where
        F: FnOnce(&mut ActorContext<'_, ClosureActor>) -> Result<(), ContractError> + 'static,
    {
        Self {
            init: Some(Box::new(init)),
        }
    }
}

impl Actor for ClosureActor {
    fn init(&mut self, ctx: &mut ActorContext<'_, Self>) -> Result<(), ContractError> {
        match self.init.take() {
            Some(init) => init(ctx),
            None => Ok(()),
        }
    }
}

/// Context handed to an actor's initializer and callbacks.
pub struct ActorContext<'k, A> {
    kernel: &'k mut Kernel,
    id: ActorId,
    handle: Rc<RefCell<A>>,
}

impl<'k, A: Actor> ActorContext<'k, A> {
    pub(crate) fn new(kernel: &'k mut Kernel, id: ActorId, handle: Rc<RefCell<A>>) -> Self {
        Self { kernel, id, handle }
    }

    fn owner(&self) -> Owner {
        Owner::Actor(self.id)
    }

    fn task<F>(&self, f: F) -> Task
    where
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
    {
        let handle = Rc::clone(&self.handle);
        let id = self.id;
        Box::new(move |kernel: &mut Kernel| {
            let mut ctx = ActorContext::new(kernel, id, Rc::clone(&handle));
            let mut actor = handle.borrow_mut();
            f(&mut *actor, &mut ctx)
        })
    }

    fn callback<E, F>(&self, f: F) -> EventCallback
    where
        E: Event,
        F: Fn(&mut A, &mut ActorContext<'_, A>, &E) -> Result<(), ContractError> + 'static,
    {
        let handle = Rc::clone(&self.handle);
        let id = self.id;
        Rc::new(move |kernel: &mut Kernel, event: &dyn Any| {
            let Some(event) = event.downcast_ref::<E>() else {
                return Ok(());
            };
            let mut ctx = ActorContext::new(kernel, id, Rc::clone(&handle));
            let mut actor = handle.borrow_mut();
            f(&mut *actor, &mut ctx, event)
        })
    }

    /// This actor's id.
    pub fn id(&self) -> ActorId {
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
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, None, true, task)
    }

    /// Schedule a passive plan. Passive plans never keep the simulation
    /// running.
    pub fn add_passive_plan<F>(&mut self, time: f64, plan: F) -> Result<(), ContractError>
    where
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
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
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
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
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(plan));
        self.kernel.add_plan(owner, time, Some(key.into()), false, task)
    }

    /// This actor's plan under `key`.
    pub fn get_plan(&self, key: &Key) -> Option<PlanInfo> {
        self.kernel.get_plan(self.owner(), key)
    }

    /// Scheduled time of this actor's plan under `key`.
    pub fn get_plan_time(&self, key: &Key) -> Option<f64> {
        self.get_plan(key).map(|info| info.time)
    }

    /// Cancel this actor's plan under `key`. Absent keys return `None`.
    pub fn remove_plan(&mut self, key: &Key) -> Option<PlanInfo> {
        let owner = self.owner();
        self.kernel.remove_plan(owner, key)
    }

    /// Keys of this actor's queued plans, in insertion order.
    pub fn get_plan_keys(&self) -> Vec<Key> {
        self.kernel.plan_keys(self.owner())
    }

    // ── subscriptions ──────────────────────────────────────────

    /// Receive every `E`. Subscribing again replaces the callback.
    pub fn subscribe<E, F>(&mut self, f: F)
    where
        E: Event,
        F: Fn(&mut A, &mut ActorContext<'_, A>, &E) -> Result<(), ContractError> + 'static,
    {
        let callback = self.callback::<E, F>(f);
        let id = self.id;
        self.kernel
            .router_mut()
            .subscribe_type(TypeId::of::<E>(), id, callback);
    }

    /// Stop receiving every `E`.
    pub fn unsubscribe<E: Event>(&mut self) {
        let id = self.id;
        self.kernel
            .router_mut()
            .unsubscribe_type(TypeId::of::<E>(), id);
    }

    /// Receive the `E` values passing `filter`.
    pub fn subscribe_filtered<E, F>(&mut self, filter: EventFilter<E>, f: F)
    where
        E: Event,
        F: Fn(&mut A, &mut ActorContext<'_, A>, &E) -> Result<(), ContractError> + 'static,
    {
        let callback = self.callback::<E, F>(f);
        let id = self.id;
        let signature = filter.signature();
        self.kernel.router_mut().subscribe_filter(
            TypeId::of::<E>(),
            id,
            signature,
            filter.into_matcher(),
            callback,
        );
    }

    /// Drop the subscription made with an equivalent `filter`.
    pub fn unsubscribe_filtered<E: Event>(&mut self, filter: &EventFilter<E>) {
        let id = self.id;
        self.kernel
            .router_mut()
            .unsubscribe_filter(TypeId::of::<E>(), id, &filter.signature());
    }

    /// Receive the `E` values whose computed label equals `label`.
    ///
    /// Fails when the label's labeler was never registered.
    pub fn subscribe_labeled<E, F>(&mut self, label: EventLabel<E>, f: F) -> Result<(), ContractError>
    where
        E: Event,
        F: Fn(&mut A, &mut ActorContext<'_, A>, &E) -> Result<(), ContractError> + 'static,
    {
        let callback = self.callback::<E, F>(f);
        let id = self.id;
        self.kernel
            .router_mut()
            .subscribe_label(label.into_slot(), id, callback)
    }

    /// Drop the subscription to `label`.
    pub fn unsubscribe_labeled<E: Event>(&mut self, label: &EventLabel<E>) {
        let id = self.id;
        self.kernel.router_mut().unsubscribe_label(label.slot(), id);
    }

    /// Run `f` once after the simulation stops.
    pub fn subscribe_to_simulation_close<F>(&mut self, f: F)
    where
        F: FnOnce(&mut A, &mut ActorContext<'_, A>) -> Result<(), ContractError> + 'static,
    {
        let (owner, task) = (self.owner(), self.task(f));
        self.kernel.subscribe_to_close(owner, task);
    }

    /// Whether anything is subscribed to `E`.
    pub fn subscribers_exist<E: Event>(&self) -> bool {
        self.kernel.subscribers_exist::<E>()
    }

    /// Publish `event`. Every data-manager reaction has run when this
    /// returns; actor subscribers run after the current unit of work.
    pub fn resolve_event<E: Event>(&mut self, event: E) -> Result<(), ContractError> {
        self.kernel.resolve_event(event)
    }

    // ── components ─────────────────────────────────────────────

    /// Add an actor. It initializes as a later unit of actor work.
    pub fn add_actor<T: Actor>(&mut self, actor: T) -> ActorId {
        self.kernel.add_actor(actor)
    }

    /// Remove a live actor. Removing this actor is allowed; the current
    /// callback still runs to completion.
    pub fn remove_actor(&mut self, actor: ActorId) -> Result<(), ContractError> {
        self.kernel.remove_actor(actor)
    }

    /// Whether `actor` is live.
    pub fn actor_exists(&self, actor: ActorId) -> bool {
        self.kernel.actor_exists(actor)
    }

    /// Shared handle to the data manager of type `T`.
    ///
    /// Actors read data managers; mutation goes through
    /// [`resolve_event`](Self::resolve_event).
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
