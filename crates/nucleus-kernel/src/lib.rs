//! Discrete-event simulation kernel.
//!
//! A [`Simulation`] is assembled from [`Plugin`]s. Plugins are initialized
//! in dependency order and register [`DataManager`]s, which own state, and
//! [`Actor`]s, which observe events and plan work. The kernel then pops
//! plans off a time-ordered queue until no active plans remain, the halt
//! time is passed, or a component calls `halt()`.
//!
//! Events resolved during a unit of work reach data managers first, in
//! validation, execution, and post-execution order. Actor subscribers
//! (by type, by [`EventFilter`], or by [`EventLabel`]) run only after every
//! data-manager reaction has finished, so actors never observe a
//! half-applied mutation.
//!
//! A kernel instance is single-threaded. Run independent instances on
//! separate threads to parallelize.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod actor;
pub mod config;
pub mod data_manager;
mod kernel;
pub mod label;
pub mod plan;
pub mod plugin;
mod resolver;
mod router;
pub mod simulation;
pub mod view;

pub use actor::{Actor, ActorContext, ClosureActor};
pub use config::SimulationConfig;
pub use data_manager::{DataManager, DataManagerContext};
pub use label::{EventFilter, EventLabel, EventLabeler};
pub use plan::PlanInfo;
pub use plugin::{Plugin, PluginBuilder, PluginContext, PluginData, PluginDataBuilder};
pub use router::EventPhase;
pub use simulation::{HaltReason, Simulation, SimulationBuilder, SimulationSummary};
pub use view::SimulationView;
