//! Event labels, labelers, and filters.
//!
//! Labels and filters let an actor subscribe to a subset of one event type.
//! A [`EventLabeler`] is registered once by a data manager and maps every
//! published event to its [`EventLabel`]; actors subscribe to specific
//! labels and only receive events whose computed label equals theirs.
//! An [`EventFilter`] needs no labeler: it carries extractor/value pairs
//! and is evaluated directly against each event.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use nucleus_core::{Event, Key, KeyTuple, LabelerId};

use crate::view::SimulationView;

/// Type-erased label identity used as the subscription index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LabelSlot {
    pub(crate) event_type: TypeId,
    pub(crate) labeler: LabelerId,
    pub(crate) primary: Key,
    pub(crate) keys: KeyTuple,
}

// ── EventLabel ─────────────────────────────────────────────────

/// A label identifying a subset of events of type `E`.
///
/// Two labels from the same labeler and primary key are equal iff their
/// ordered key tuples are equal.
pub struct EventLabel<E> {
    slot: LabelSlot,
    _event: PhantomData<fn() -> E>,
}

impl<E: Event> EventLabel<E> {
    /// Build a label for `labeler`, partitioned under `primary`.
    pub fn new(
        labeler: impl Into<LabelerId>,
        primary: impl Into<Key>,
        keys: impl IntoIterator<Item = Key>,
    ) -> Self {
        Self {
            slot: LabelSlot {
                event_type: TypeId::of::<E>(),
                labeler: labeler.into(),
                primary: primary.into(),
                keys: keys.into_iter().collect(),
            },
            _event: PhantomData,
        }
    }
}

impl<E> EventLabel<E> {
    /// The labeler this label belongs to.
    pub fn labeler(&self) -> &LabelerId {
        &self.slot.labeler
    }

    /// The coarse partition value.
    pub fn primary_key(&self) -> &Key {
        &self.slot.primary
    }

    /// The ordered label components.
    pub fn keys(&self) -> &[Key] {
        &self.slot.keys
    }

    pub(crate) fn slot(&self) -> &LabelSlot {
        &self.slot
    }

    pub(crate) fn into_slot(self) -> LabelSlot {
        self.slot
    }
}

impl<E> Clone for EventLabel<E> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            _event: PhantomData,
        }
    }
}

impl<E> PartialEq for EventLabel<E> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<E> Eq for EventLabel<E> {}

impl<E> fmt::Debug for EventLabel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLabel")
            .field("labeler", &self.slot.labeler)
            .field("primary", &self.slot.primary)
            .field("keys", &self.slot.keys)
            .finish()
    }
}

// ── EventLabeler ───────────────────────────────────────────────

type LabelFn<E> = Rc<dyn Fn(&SimulationView<'_>, &E) -> EventLabel<E>>;

/// Type-erased labeler stored by the router.
pub(crate) type ErasedLabeler = Rc<dyn Fn(&SimulationView<'_>, &dyn Any) -> Option<LabelSlot>>;

/// Computes the label of every published `E`.
///
/// The produced label must report this labeler's id and the event's own
/// primary key; the router rejects a mismatch when the event is routed.
pub struct EventLabeler<E> {
    id: LabelerId,
    f: LabelFn<E>,
}

impl<E: Event> EventLabeler<E> {
    /// Create a labeler.
    pub fn new<F>(id: impl Into<LabelerId>, f: F) -> Self
    where
        F: Fn(&SimulationView<'_>, &E) -> EventLabel<E> + 'static,
    {
        Self {
            id: id.into(),
            f: Rc::new(f),
        }
    }

    /// The labeler id.
    pub fn id(&self) -> &LabelerId {
        &self.id
    }

    pub(crate) fn into_erased(self) -> (LabelerId, ErasedLabeler) {
        let f = self.f;
        let erased: ErasedLabeler = Rc::new(move |view, event| {
            event
                .downcast_ref::<E>()
                .map(|event| f(view, event).into_slot())
        });
        (self.id, erased)
    }
}

impl<E> Clone for EventLabeler<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            f: Rc::clone(&self.f),
        }
    }
}

// ── EventFilter ────────────────────────────────────────────────

type Extractor<E> = Rc<dyn Fn(&E) -> Key>;

/// Matches events of type `E` by extractor/value pairs.
///
/// An event passes iff every extractor applied to it equals its paired
/// value. A filter with no pairs passes every event.
///
/// A filter is identified by its extractor names and values, not by the
/// extractor closures. Subscribing an actor with a filter whose names and
/// values equal a live subscription replaces that subscription, closures
/// included, and unsubscribing removes it. Give distinct extractors
/// distinct names.
pub struct EventFilter<E> {
    pairs: Vec<(&'static str, Extractor<E>, Key)>,
}

impl<E: Event> EventFilter<E> {
    /// A filter that passes every event.
    pub fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Require `f(event) == value`.
    ///
    /// `id` names the extractor and is the only part of it that takes part
    /// in filter identity.
    #[must_use]
    pub fn add_function_value_pair<F>(mut self, id: &'static str, f: F, value: impl Into<Key>) -> Self
    where
        F: Fn(&E) -> Key + 'static,
    {
        self.pairs.push((id, Rc::new(f), value.into()));
        self
    }

    /// Whether `event` passes this filter.
    pub fn matches(&self, event: &E) -> bool {
        self.pairs.iter().all(|(_, f, value)| f(event) == *value)
    }

    pub(crate) fn signature(&self) -> Vec<(&'static str, Key)> {
        self.pairs
            .iter()
            .map(|(id, _, value)| (*id, value.clone()))
            .collect()
    }

    pub(crate) fn into_matcher(self) -> Rc<dyn Fn(&dyn Any) -> bool> {
        Rc::new(move |event| {
            event
                .downcast_ref::<E>()
                .is_some_and(|event| self.matches(event))
        })
    }
}

impl<E: Event> Default for EventFilter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventFilter<E> {
    fn clone(&self) -> Self {
        Self {
            pairs: self.pairs.clone(),
        }
    }
}
