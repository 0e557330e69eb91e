//! The [`Event`] trait.

use std::any::Any;

use crate::key::Key;

/// A value published through the kernel's event router.
///
/// Events are routed by their concrete type. The optional
/// [`primary_key`](Event::primary_key) partitions labeled subscriptions
/// for one event type so the router only evaluates labelers whose
/// subscribers share the event's primary key.
pub trait Event: Any {
    /// Coarse first-level index for labeled subscriptions.
    ///
    /// Labels produced for this event must report the same value.
    fn primary_key(&self) -> Key {
        Key::Unit
    }
}
