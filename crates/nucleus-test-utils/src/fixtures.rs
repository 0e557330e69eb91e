//! Scripted plugin fixtures.
//!
//! - [`TestPlugin`] registers one [`ClosureActor`] per scripted actor and,
//!   when given data-manager plans, one [`TestDataManager`].
//! - [`TestActorPlan`] / [`TestDataManagerPlan`] schedule a closure at a
//!   fixed time, active or passive.
//!
//! Every step closure is `Send + Sync` so the resulting [`Plugin`] can be
//! handed to experiment worker threads.

use std::sync::Arc;

use nucleus_core::{ContractError, PluginId};
use nucleus_kernel::{ActorContext, ClosureActor, DataManager, DataManagerContext, Plugin};

type ActorStep =
    Arc<dyn Fn(&mut ActorContext<'_, ClosureActor>) -> Result<(), ContractError> + Send + Sync>;
type DataManagerStep = Arc<
    dyn Fn(&mut DataManagerContext<'_, TestDataManager>) -> Result<(), ContractError>
        + Send
        + Sync,
>;

/// A closure an actor runs at a fixed time.
#[derive(Clone)]
pub struct TestActorPlan {
    pub time: f64,
    pub active: bool,
    step: ActorStep,
}

impl TestActorPlan {
    /// Active plan at `time`.
    pub fn new<F>(time: f64, step: F) -> Self
    where
        F: Fn(&mut ActorContext<'_, ClosureActor>) -> Result<(), ContractError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            time,
            active: true,
            step: Arc::new(step),
        }
    }

    /// Passive plan at `time`.
    pub fn passive<F>(time: f64, step: F) -> Self
    where
        F: Fn(&mut ActorContext<'_, ClosureActor>) -> Result<(), ContractError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            active: false,
            ..Self::new(time, step)
        }
    }
}

/// A closure the test data manager runs at a fixed time.
#[derive(Clone)]
pub struct TestDataManagerPlan {
    pub time: f64,
    pub active: bool,
    step: DataManagerStep,
}

impl TestDataManagerPlan {
    /// Active plan at `time`.
    pub fn new<F>(time: f64, step: F) -> Self
    where
        F: Fn(&mut DataManagerContext<'_, TestDataManager>) -> Result<(), ContractError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            time,
            active: true,
            step: Arc::new(step),
        }
    }

    /// Passive plan at `time`.
    pub fn passive<F>(time: f64, step: F) -> Self
    where
        F: Fn(&mut DataManagerContext<'_, TestDataManager>) -> Result<(), ContractError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            active: false,
            ..Self::new(time, step)
        }
    }
}

/// Data manager that schedules its scripted plans at init.
pub struct TestDataManager {
    plans: Vec<TestDataManagerPlan>,
}

impl TestDataManager {
    pub fn new(plans: Vec<TestDataManagerPlan>) -> Self {
        Self { plans }
    }
}

impl DataManager for TestDataManager {
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> Result<(), ContractError> {
        for TestDataManagerPlan { time, active, step } in self.plans.drain(..) {
            if active {
                ctx.add_plan(time, move |_, ctx| step(ctx))?;
            } else {
                ctx.add_passive_plan(time, move |_, ctx| step(ctx))?;
            }
        }
        Ok(())
    }
}

fn schedule(
    ctx: &mut ActorContext<'_, ClosureActor>,
    plans: Vec<TestActorPlan>,
) -> Result<(), ContractError> {
    for TestActorPlan { time, active, step } in plans {
        if active {
            ctx.add_plan(time, move |_, ctx| step(ctx))?;
        } else {
            ctx.add_passive_plan(time, move |_, ctx| step(ctx))?;
        }
    }
    Ok(())
}

/// Builder for a plugin made of scripted actors and data-manager plans.
pub struct TestPlugin {
    id: PluginId,
    dependencies: Vec<PluginId>,
    actors: Vec<Vec<TestActorPlan>>,
    data_manager_plans: Vec<TestDataManagerPlan>,
}

impl TestPlugin {
    /// A plugin with id `"test"` and nothing scripted.
    pub fn builder() -> Self {
        Self {
            id: PluginId::new("test"),
            dependencies: Vec::new(),
            actors: Vec::new(),
            data_manager_plans: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<PluginId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn add_dependency(mut self, id: impl Into<PluginId>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Script one actor.
    pub fn add_actor(mut self, plans: impl IntoIterator<Item = TestActorPlan>) -> Self {
        self.actors.push(plans.into_iter().collect());
        self
    }

    /// Script one plan on the shared [`TestDataManager`].
    pub fn add_data_manager_plan(mut self, plan: TestDataManagerPlan) -> Self {
        self.data_manager_plans.push(plan);
        self
    }

    pub fn build(self) -> Plugin {
        let Self {
            id,
            dependencies,
            actors,
            data_manager_plans,
        } = self;
        dependencies
            .into_iter()
            .fold(Plugin::builder(id), |b, dep| b.add_dependency(dep))
            .set_initializer(move |ctx| {
                if !data_manager_plans.is_empty() {
                    ctx.add_data_manager(TestDataManager::new(data_manager_plans.clone()))?;
                }
                for plans in &actors {
                    let plans = plans.clone();
                    ctx.add_actor(ClosureActor::new(move |ctx| schedule(ctx, plans)));
                }
                Ok(())
            })
            .build()
    }
}
