//! Core types for the Nucleus simulation kernel.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! vocabulary shared by the kernel and the experiment runner: component
//! identifiers, hashable [`Key`] values, the [`Event`] trait, and the single
//! [`ContractError`] type every precondition violation surfaces as.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod event;
pub mod id;
pub mod key;

pub use error::{ContractError, CycleMember, ErrorKind};
pub use event::Event;
pub use id::{ActorId, DataManagerId, LabelerId, PluginId};
pub use key::{Key, KeyTuple};
