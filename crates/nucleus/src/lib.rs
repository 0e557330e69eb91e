//! Nucleus: a discrete-event simulation kernel and experiment runner.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Nucleus sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use nucleus::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! struct Tick;
//! impl Event for Tick {}
//!
//! let plugin = Plugin::builder("clock")
//!     .set_initializer(|ctx| {
//!         ctx.add_actor(ClosureActor::new(|ctx| {
//!             ctx.subscribe::<Tick, _>(|_, ctx, _| {
//!                 ctx.release_output(ctx.time());
//!                 Ok(())
//!             });
//!             ctx.add_plan(2.5, |_, ctx| ctx.resolve_event(Tick))
//!         }));
//!         Ok(())
//!     })
//!     .build();
//!
//! let mut sim = Simulation::builder().add_plugin(plugin).build().unwrap();
//! let summary = sim.execute().unwrap();
//! assert_eq!(summary.end_time, 2.5);
//! assert_eq!(summary.halted_by, HaltReason::NoActivePlans);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `nucleus-core` | IDs, keys, the `Event` trait, contract errors |
//! | [`kernel`] | `nucleus-kernel` | Simulations, plugins, data managers, actors |
//! | [`experiment`] | `nucleus-experiment` | Dimensions, scenarios, the worker pool |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identifiers, keys, events, and errors (`nucleus-core`).
pub use nucleus_core as types;

/// The simulation kernel (`nucleus-kernel`).
///
/// Build a [`kernel::Simulation`] from [`kernel::Plugin`]s and execute it.
pub use nucleus_kernel as kernel;

/// Scenario sweeps over a worker pool (`nucleus-experiment`).
pub use nucleus_experiment as experiment;

/// Common imports for typical Nucleus usage.
///
/// ```rust
/// use nucleus::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use nucleus_core::{ActorId, ContractError, DataManagerId, ErrorKind, Event, Key, PluginId};

    // Kernel
    pub use nucleus_kernel::{
        Actor, ActorContext, ClosureActor, DataManager, DataManagerContext, EventFilter,
        EventLabel, EventLabeler, EventPhase, HaltReason, Plugin, PluginContext, PluginData,
        PluginDataBuilder, Simulation, SimulationConfig, SimulationSummary,
    };

    // Experiment
    pub use nucleus_experiment::{
        Dimension, Experiment, ExperimentConfig, ExperimentContext, ExperimentError,
        ScenarioStatus,
    };
}
