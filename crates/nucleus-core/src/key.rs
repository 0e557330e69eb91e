//! Hashable key values used for plan keys, event label tuples, and event
//! filter targets.
//!
//! Keys form a closed set of value shapes rather than arbitrary objects, so
//! equality and hashing are derived and never depend on run-time casts.

use smallvec::SmallVec;
use std::fmt;

use crate::id::{ActorId, DataManagerId};

/// A hashable, totally ordered key value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// The unit key. Default primary key of events that do not partition
    /// their subscribers.
    Unit,
    /// A boolean key.
    Bool(bool),
    /// A signed integer key.
    Int(i64),
    /// An unsigned integer key.
    Uint(u64),
    /// A text key.
    Text(String),
}

/// Ordered tuple of keys identifying an event label.
///
/// Most labels carry at most four components, which stay inline.
pub type KeyTuple = SmallVec<[Key; 4]>;

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<()> for Key {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Key {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Self::Uint(u64::from(v))
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<usize> for Key {
    fn from(v: usize) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ActorId> for Key {
    fn from(v: ActorId) -> Self {
        Self::Uint(u64::from(v.0))
    }
}

impl From<DataManagerId> for Key {
    fn from(v: DataManagerId) -> Self {
        Self::Uint(u64::from(v.0))
    }
}
