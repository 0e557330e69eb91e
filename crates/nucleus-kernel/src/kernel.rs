//! The execution loop and reentrancy controller.
//!
//! [`Kernel`] owns every piece of mutable simulation state: the clock, the
//! plan queue, the subscription index, the registered components, and the
//! FIFO work queues. Work originating from data managers is drained to
//! completion before each unit of actor work, so an actor only ever
//! observes state after every data-manager reaction to the triggering
//! work has finished. A newly added actor initializes as the next unit of
//! actor work.
//!
//! Components never hold the kernel. Each callback is erased into a
//! closure that receives `&mut Kernel` when dispatched and rebuilds the
//! typed context for its owner on the spot.

use std::any::{type_name, Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use nucleus_core::{ActorId, ContractError, DataManagerId, ErrorKind, Event, Key};
use tracing::{debug, trace};

use crate::actor::{Actor, ActorContext};
use crate::config::SimulationConfig;
use crate::data_manager::{DataManager, DataManagerContext};
use crate::label::ErasedLabeler;
use crate::plan::{Owner, PlanInfo, PlanQueue, PlanRecord};
use crate::plugin::{Plugin, PluginContext};
use crate::router::EventRouter;
use crate::simulation::{HaltReason, SimulationSummary};
use crate::view::SimulationView;

/// A unit of work with typed context already captured.
pub(crate) type Task = Box<dyn FnOnce(&mut Kernel) -> Result<(), ContractError>>;

/// An erased event subscriber.
pub(crate) type EventCallback = Rc<dyn Fn(&mut Kernel, &dyn Any) -> Result<(), ContractError>>;

/// Receives every released output.
pub(crate) type OutputConsumer = Box<dyn FnMut(Box<dyn Any>)>;

pub(crate) enum Work {
    Task(Task),
    Event(EventCallback, Rc<dyn Any>),
    /// Locate actor subscribers for an event whose data-manager phases
    /// have all been delivered.
    Route {
        event: Rc<dyn Any>,
        event_type: TypeId,
        primary: Key,
    },
}

pub(crate) struct WorkItem {
    owner: Option<Owner>,
    work: Work,
}

impl WorkItem {
    pub(crate) fn task(owner: Owner, task: Task) -> Self {
        Self {
            owner: Some(owner),
            work: Work::Task(task),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    NotStarted,
    Running,
    Halted,
}

pub(crate) struct Kernel {
    time: f64,
    state: RunState,
    halt_requested: bool,
    scenario_id: Option<usize>,
    plans: PlanQueue<Task>,
    router: EventRouter<EventCallback, ErasedLabeler>,
    /// Each entry is an `Rc<RefCell<T>>` for the registered type `T`.
    data_managers: Vec<Rc<dyn Any>>,
    dm_by_type: HashMap<TypeId, DataManagerId>,
    actors: HashSet<ActorId>,
    next_actor_id: u32,
    dm_queue: VecDeque<WorkItem>,
    actor_queue: VecDeque<WorkItem>,
    /// Initialization of actors added since the last unit of actor work.
    /// Runs ahead of `actor_queue`.
    actor_inits: VecDeque<WorkItem>,
    dm_queue_active: bool,
    dm_close: Vec<WorkItem>,
    actor_close: Vec<WorkItem>,
    output: Option<OutputConsumer>,
    plans_executed: u64,
}

impl Kernel {
    pub(crate) fn new(config: &SimulationConfig, output: Option<OutputConsumer>) -> Self {
        Self {
            time: config.start_time,
            state: RunState::NotStarted,
            halt_requested: false,
            scenario_id: config.scenario_id,
            plans: PlanQueue::new(),
            router: EventRouter::new(),
            data_managers: Vec::new(),
            dm_by_type: HashMap::new(),
            actors: HashSet::new(),
            next_actor_id: 0,
            dm_queue: VecDeque::new(),
            actor_queue: VecDeque::new(),
            actor_inits: VecDeque::new(),
            dm_queue_active: false,
            dm_close: Vec::new(),
            actor_close: Vec::new(),
            output,
            plans_executed: 0,
        }
    }

    pub(crate) fn time(&self) -> f64 {
        self.time
    }

    pub(crate) fn router_mut(&mut self) -> &mut EventRouter<EventCallback, ErasedLabeler> {
        &mut self.router
    }

    // ── plans ──────────────────────────────────────────────────

    pub(crate) fn add_plan(
        &mut self,
        owner: Owner,
        time: f64,
        key: Option<Key>,
        active: bool,
        task: Task,
    ) -> Result<(), ContractError> {
        self.plans
            .add(self.time, owner, time, key, active, task)
            .map(|_| ())
    }

    pub(crate) fn get_plan(&self, owner: Owner, key: &Key) -> Option<PlanInfo> {
        self.plans.get(owner, key)
    }

    pub(crate) fn remove_plan(&mut self, owner: Owner, key: &Key) -> Option<PlanInfo> {
        self.plans.remove(owner, key)
    }

    pub(crate) fn plan_keys(&self, owner: Owner) -> Vec<Key> {
        self.plans.keys(owner)
    }

    // ── components ─────────────────────────────────────────────

    pub(crate) fn add_data_manager<T: DataManager>(
        &mut self,
        dm: T,
    ) -> Result<DataManagerId, ContractError> {
        let type_id = TypeId::of::<T>();
        if self.dm_by_type.contains_key(&type_id) {
            return Err(ErrorKind::DuplicateDataManager {
                type_name: type_name::<T>(),
            }
            .into());
        }
        let id = DataManagerId(self.data_managers.len() as u32);
        let handle = Rc::new(RefCell::new(dm));
        self.data_managers.push(Rc::clone(&handle) as Rc<dyn Any>);
        self.dm_by_type.insert(type_id, id);
        debug!(data_manager = %id, type_name = type_name::<T>(), "registered data manager");

        let init: Task = Box::new(move |kernel: &mut Kernel| {
            let mut ctx = DataManagerContext::new(kernel, id, Rc::clone(&handle));
            let mut dm = handle.borrow_mut();
            dm.init(&mut ctx)
        });
        self.dm_queue
            .push_back(WorkItem::task(Owner::DataManager(id), init));
        Ok(id)
    }

    pub(crate) fn data_manager<T: DataManager>(&self) -> Result<Rc<RefCell<T>>, ContractError> {
        let unknown = || -> ContractError {
            ErrorKind::UnknownDataManagerType {
                type_name: type_name::<T>(),
            }
            .into()
        };
        let id = self.dm_by_type.get(&TypeId::of::<T>()).ok_or_else(unknown)?;
        let handle = self
            .data_managers
            .get(id.0 as usize)
            .ok_or_else(unknown)?;
        Rc::clone(handle)
            .downcast::<RefCell<T>>()
            .map_err(|_| unknown())
    }

    pub(crate) fn add_actor<T: Actor>(&mut self, actor: T) -> ActorId {
        let id = ActorId(self.next_actor_id);
        self.next_actor_id += 1;
        self.actors.insert(id);
        trace!(actor = %id, "added actor");

        let handle = Rc::new(RefCell::new(actor));
        let init: Task = Box::new(move |kernel: &mut Kernel| {
            let mut ctx = ActorContext::new(kernel, id, Rc::clone(&handle));
            let mut actor = handle.borrow_mut();
            actor.init(&mut ctx)
        });
        self.actor_inits
            .push_back(WorkItem::task(Owner::Actor(id), init));
        id
    }

    /// Remove a live actor and every subscription it holds. Its queued work
    /// is discarded when dispatched.
    pub(crate) fn remove_actor(&mut self, actor: ActorId) -> Result<(), ContractError> {
        if !self.actors.remove(&actor) {
            return Err(ErrorKind::UnknownActorId { actor }.into());
        }
        self.router.remove_actor(actor);
        trace!(%actor, "removed actor");
        Ok(())
    }

    pub(crate) fn actor_exists(&self, actor: ActorId) -> bool {
        self.actors.contains(&actor)
    }

    pub(crate) fn subscribe_to_close(&mut self, owner: Owner, task: Task) {
        let item = WorkItem::task(owner, task);
        match owner {
            Owner::DataManager(_) => self.dm_close.push(item),
            Owner::Actor(_) => self.actor_close.push(item),
        }
    }

    // ── events and outputs ─────────────────────────────────────

    pub(crate) fn subscribers_exist<E: Event>(&self) -> bool {
        self.router.subscribers_exist(TypeId::of::<E>())
    }

    /// Publish `event`.
    ///
    /// Data-manager subscribers are queued in phase order, followed by the
    /// routing step that queues actor subscribers. When no data-manager
    /// work is being drained the queue is drained before returning.
    pub(crate) fn resolve_event<E: Event>(&mut self, event: E) -> Result<(), ContractError> {
        let event_type = TypeId::of::<E>();
        if !self.router.subscribers_exist(event_type) {
            return Ok(());
        }
        let primary = event.primary_key();
        let event: Rc<dyn Any> = Rc::new(event);
        for (dm, callback) in self.router.phase_deliveries(event_type) {
            self.dm_queue.push_back(WorkItem {
                owner: Some(Owner::DataManager(dm)),
                work: Work::Event(callback, Rc::clone(&event)),
            });
        }
        self.dm_queue.push_back(WorkItem {
            owner: None,
            work: Work::Route {
                event,
                event_type,
                primary,
            },
        });
        self.drain_data_managers()
    }

    pub(crate) fn release_output<O: Any>(&mut self, output: O) {
        match self.output.as_mut() {
            Some(consumer) => consumer(Box::new(output)),
            None => trace!(output = type_name::<O>(), "no output consumer, dropping output"),
        }
    }

    pub(crate) fn halt(&mut self) {
        self.halt_requested = true;
    }

    // ── dispatch ───────────────────────────────────────────────

    /// Drain the data-manager queue unless a drain is already in progress,
    /// in which case the outer drain picks up anything just queued.
    pub(crate) fn drain_data_managers(&mut self) -> Result<(), ContractError> {
        if self.dm_queue_active {
            return Ok(());
        }
        self.dm_queue_active = true;
        let result = self.drain_dm_queue();
        self.dm_queue_active = false;
        result
    }

    fn drain_dm_queue(&mut self) -> Result<(), ContractError> {
        while let Some(item) = self.dm_queue.pop_front() {
            self.run(item)?;
        }
        Ok(())
    }

    /// Drain the queues: all data-manager work before each actor item, and
    /// pending actor initialization before any other actor work.
    fn drain(&mut self) -> Result<(), ContractError> {
        loop {
            self.drain_data_managers()?;
            let next = self
                .actor_inits
                .pop_front()
                .or_else(|| self.actor_queue.pop_front());
            let Some(item) = next else {
                return Ok(());
            };
            self.run(item)?;
        }
    }

    fn run(&mut self, item: WorkItem) -> Result<(), ContractError> {
        let WorkItem { owner, work } = item;
        if let Some(Owner::Actor(actor)) = owner {
            if !self.actors.contains(&actor) {
                trace!(%actor, "discarding work for removed actor");
                return Ok(());
            }
        }
        let result = match work {
            Work::Task(task) => task(self),
            Work::Event(callback, event) => callback(self, &*event),
            Work::Route {
                event,
                event_type,
                primary,
            } => self.route(event, event_type, &primary),
        };
        result.map_err(|e| {
            let e = e.with_time(self.time);
            match owner {
                Some(Owner::Actor(actor)) => e.with_actor(actor),
                Some(Owner::DataManager(dm)) => e.with_data_manager(dm),
                None => e,
            }
        })
    }

    fn route(
        &mut self,
        event: Rc<dyn Any>,
        event_type: TypeId,
        primary: &Key,
    ) -> Result<(), ContractError> {
        let deliveries = {
            let view = SimulationView::new(self);
            self.router
                .actor_deliveries(event_type, &*event, primary, |labeler| {
                    labeler(&view, &*event)
                })?
        };
        for (actor, callback) in deliveries {
            self.actor_queue.push_back(WorkItem {
                owner: Some(Owner::Actor(actor)),
                work: Work::Event(callback, Rc::clone(&event)),
            });
        }
        Ok(())
    }

    fn dispatch(&mut self, record: PlanRecord<Task>) {
        if let Owner::Actor(actor) = record.owner {
            if !self.actors.contains(&actor) {
                trace!(%actor, time = record.time, "discarding plan of removed actor");
                return;
            }
        }
        self.time = record.time;
        self.plans_executed += 1;
        trace!(time = record.time, owner = ?record.owner, "executing plan");
        let item = WorkItem::task(record.owner, record.payload);
        match record.owner {
            Owner::DataManager(_) => self.dm_queue.push_back(item),
            Owner::Actor(_) => self.actor_queue.push_back(item),
        }
    }

    // ── lifecycle ──────────────────────────────────────────────

    /// Initialize `plugins` in order and run until halted.
    pub(crate) fn execute(
        &mut self,
        plugins: &[Plugin],
        halt_time: Option<f64>,
    ) -> Result<SimulationSummary, ContractError> {
        if self.state != RunState::NotStarted {
            return Err(ErrorKind::RepeatedExecution.into());
        }
        self.state = RunState::Running;
        let start_time = self.time;
        debug!(scenario = ?self.scenario_id, start_time, "simulation starting");

        let result = self.run_to_halt(plugins, halt_time);
        self.state = RunState::Halted;
        let halted_by = result?;

        debug!(
            scenario = ?self.scenario_id,
            end_time = self.time,
            plans_executed = self.plans_executed,
            ?halted_by,
            "simulation halted"
        );
        Ok(SimulationSummary {
            start_time,
            end_time: self.time,
            plans_executed: self.plans_executed,
            halted_by,
        })
    }

    fn run_to_halt(
        &mut self,
        plugins: &[Plugin],
        halt_time: Option<f64>,
    ) -> Result<HaltReason, ContractError> {
        for plugin in plugins {
            debug!(plugin = %plugin.id(), "initializing plugin");
            let now = self.time;
            let initialized = plugin.initialize(&mut PluginContext::new(self, plugin));
            initialized
                .and_then(|()| self.drain_data_managers())
                .map_err(|e| e.with_plugin(plugin.id().clone()).with_time(now))?;
        }

        let reason = loop {
            self.drain()?;
            if self.halt_requested {
                break HaltReason::Requested;
            }
            if self.plans.active_count() == 0 {
                break HaltReason::NoActivePlans;
            }
            match (self.plans.peek_time(), halt_time) {
                (None, _) => break HaltReason::NoActivePlans,
                (Some(next), Some(halt)) if next > halt => break HaltReason::HaltTime,
                _ => {}
            }
            if let Some(record) = self.plans.pop() {
                self.dispatch(record);
            }
        };

        self.close()?;
        Ok(reason)
    }

    /// Run simulation-close subscribers: data managers, then actors.
    fn close(&mut self) -> Result<(), ContractError> {
        let dm_close = std::mem::take(&mut self.dm_close);
        self.dm_queue.extend(dm_close);
        self.drain()?;
        let actor_close = std::mem::take(&mut self.actor_close);
        self.actor_queue.extend(actor_close);
        self.drain()
    }
}
