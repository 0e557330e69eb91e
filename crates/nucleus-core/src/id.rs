//! Strongly-typed identifiers for kernel components.

use std::fmt;
use std::sync::Arc;

/// Identifies an actor within a single simulation.
///
/// Assigned monotonically in registration order. A removed actor's id is
/// never handed out again within the same simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

impl From<u32> for ActorId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a data manager within a single simulation.
///
/// Assigned monotonically in plugin initialization order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataManagerId(pub u32);

impl fmt::Display for DataManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data_manager:{}", self.0)
    }
}

impl From<u32> for DataManagerId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Names a plugin.
///
/// Plugin ids are chosen by plugin authors and must be unique within one
/// simulation. Cloning is cheap (shared string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(Arc<str>);

impl PluginId {
    /// Create a plugin id from a name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The plugin name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

/// Names an event labeler.
///
/// A labeler id is registered once per simulation; event labels carry the
/// id of the labeler that produces them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelerId(Arc<str>);

impl LabelerId {
    /// Create a labeler id from a name.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The labeler name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LabelerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LabelerId {
    fn from(v: &str) -> Self {
        Self::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_numerically() {
        assert!(ActorId(2) < ActorId(10));
        assert!(DataManagerId(0) < DataManagerId(1));
    }

    #[test]
    fn plugin_ids_compare_by_name() {
        assert_eq!(PluginId::new("people"), PluginId::from("people"));
        assert_ne!(PluginId::new("people"), PluginId::new("groups"));
        assert_eq!(PluginId::new("groups").to_string(), "groups");
    }

    #[test]
    fn display_is_tagged() {
        assert_eq!(ActorId(3).to_string(), "actor:3");
        assert_eq!(DataManagerId(1).to_string(), "data_manager:1");
    }
}
