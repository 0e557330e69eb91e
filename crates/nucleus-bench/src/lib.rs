//! Benchmark profiles for the Nucleus simulation kernel.
//!
//! Provides ready-made plugin sets for benchmarking:
//!
//! - [`plan_times`]: deterministic random plan times via seed
//! - [`scheduling_profile`]: one actor working through a random plan schedule
//! - [`fan_out_profile`]: one data manager publishing labeled events to many actors
//! - [`sweep_experiment`]: a one-dimension experiment over [`scheduling_profile`]

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use nucleus_core::{ContractError, Event, Key};
use nucleus_experiment::{Dimension, Experiment, ExperimentError};
use nucleus_kernel::{
    ClosureActor, DataManager, DataManagerContext, EventLabel, EventLabeler, Plugin, PluginData,
    PluginDataBuilder, Simulation, SimulationSummary,
};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// `n` plan times drawn uniformly from `[0, horizon)`, reproducible per seed.
pub fn plan_times(n: usize, horizon: f64, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            // 53 random mantissa bits in [0, 1).
            let unit = (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
            unit * horizon
        })
        .collect()
}

/// Plan count and seed for [`scheduling_profile`], editable per scenario.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Schedule {
    /// Plans the actor schedules at startup.
    pub plans: usize,
    /// Seed for the plan times.
    pub seed: u64,
}

impl PluginData for Schedule {
    fn to_builder(&self) -> Box<dyn PluginDataBuilder> {
        Box::new(*self)
    }
}

impl PluginDataBuilder for Schedule {
    fn build(&self) -> Arc<dyn PluginData> {
        Arc::new(*self)
    }
}

/// One actor that schedules `plans` empty active plans at random times
/// in `[0, 1000)`.
pub fn scheduling_profile(plans: usize, seed: u64) -> Vec<Plugin> {
    let plugin = Plugin::builder("schedule")
        .add_plugin_data(Schedule { plans, seed })
        .set_initializer(|ctx| {
            let schedule = *ctx.get_plugin_data::<Schedule>()?;
            ctx.add_actor(ClosureActor::new(move |ctx| {
                for time in plan_times(schedule.plans, 1000.0, schedule.seed) {
                    ctx.add_plan(time, |_, _| Ok(()))?;
                }
                Ok(())
            }));
            Ok(())
        })
        .build();
    vec![plugin]
}

/// Event routed to exactly one actor by its `target` label.
#[derive(Clone, Debug)]
pub struct Ping {
    /// Index of the receiving actor.
    pub target: u32,
}

impl Event for Ping {}

struct Hub {
    actors: u32,
    events: u32,
}

impl DataManager for Hub {
    fn init(&mut self, ctx: &mut DataManagerContext<'_, Self>) -> Result<(), ContractError> {
        ctx.add_event_labeler(EventLabeler::<Ping>::new("target", |_, ping| {
            EventLabel::new("target", (), [Key::from(ping.target)])
        }))?;
        let (actors, events) = (self.actors, self.events);
        ctx.add_plan(1.0, move |_, ctx| {
            for i in 0..events {
                ctx.resolve_event(Ping {
                    target: i % actors.max(1),
                })?;
            }
            Ok(())
        })
    }
}

/// `actors` actors, each subscribed to its own label, and a data manager
/// publishing `events` pings at time 1.
pub fn fan_out_profile(actors: u32, events: u32) -> Vec<Plugin> {
    let hub = Plugin::builder("hub")
        .set_initializer(move |ctx| {
            ctx.add_data_manager(Hub { actors, events })?;
            Ok(())
        })
        .build();
    let listeners = Plugin::builder("listeners")
        .add_dependency("hub")
        .set_initializer(move |ctx| {
            for target in 0..actors {
                ctx.add_actor(ClosureActor::new(move |ctx| {
                    ctx.subscribe_labeled::<Ping, _>(
                        EventLabel::new("target", (), [Key::from(target)]),
                        |_, _, _| Ok(()),
                    )
                }));
            }
            Ok(())
        })
        .build();
    vec![hub, listeners]
}

/// Build and execute a simulation from `plugins`.
pub fn run(plugins: Vec<Plugin>) -> Result<SimulationSummary, ContractError> {
    plugins
        .into_iter()
        .fold(Simulation::builder(), |b, p| b.add_plugin(p))
        .build()?
        .execute()
}

/// An experiment varying the [`scheduling_profile`] seed over `scenarios`
/// levels, run on `threads` workers.
pub fn sweep_experiment(
    scenarios: u64,
    plans: usize,
    threads: usize,
) -> Result<Experiment, ExperimentError> {
    let seeds = (0..scenarios).fold(Dimension::builder().add_metadata("seed"), |b, seed| {
        b.add_level(move |ctx| {
            if let Some(schedule) = ctx.get_plugin_data_builder::<Schedule>() {
                schedule.seed = seed;
            }
            vec![seed.to_string()]
        })
    });
    scheduling_profile(plans, 0)
        .into_iter()
        .fold(Experiment::builder(), |b, p| b.add_plugin(p))
        .add_dimension(seeds.build())
        .thread_count(threads)
        .build()
}
