//! Subscription index and delivery planning for published events.
//!
//! The router never invokes callbacks itself. It answers two questions
//! for the execution loop: which data-manager callbacks see an event, in
//! phase order, and which actor callbacks see it, by class, by filter, and
//! by label. Every index branch is removed as soon as its last subscriber
//! leaves, so long runs with transient subscriptions do not accumulate
//! empty entries.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use nucleus_core::{ActorId, ContractError, DataManagerId, ErrorKind, Key, LabelerId};

use crate::label::LabelSlot;

/// Data-manager resolution phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventPhase {
    /// Runs first. Subscribers inspect the event before any mutation.
    Validation,
    /// Runs second, in registration order. Subscribers apply mutations.
    Execution,
    /// Runs last. Subscribers observe the completed mutation.
    PostExecution,
}

impl EventPhase {
    const ALL: [EventPhase; 3] = [Self::Validation, Self::Execution, Self::PostExecution];

    fn index(self) -> usize {
        match self {
            Self::Validation => 0,
            Self::Execution => 1,
            Self::PostExecution => 2,
        }
    }
}

type Signature = Vec<(&'static str, Key)>;
type Matcher = Rc<dyn Fn(&dyn Any) -> bool>;

struct FilterEntry<C> {
    actor: ActorId,
    signature: Signature,
    matcher: Matcher,
    callback: C,
}

/// The subscription index.
///
/// `C` is the stored callback type and `L` the stored labeler type; the
/// kernel instantiates both with type-erased closures.
pub(crate) struct EventRouter<C, L> {
    phases: HashMap<TypeId, [IndexMap<DataManagerId, C>; 3]>,
    by_type: HashMap<TypeId, IndexMap<ActorId, C>>,
    filters: HashMap<TypeId, Vec<FilterEntry<C>>>,
    labelers: HashMap<LabelerId, (TypeId, L)>,
    /// `(event type, primary key)` → labelers with live subscribers under
    /// that partition, with their subscription counts.
    branches: HashMap<(TypeId, Key), IndexMap<LabelerId, usize>>,
    labeled: HashMap<LabelSlot, IndexMap<ActorId, C>>,
    counts: HashMap<TypeId, usize>,
}

impl<C: Clone, L> EventRouter<C, L> {
    pub(crate) fn new() -> Self {
        Self {
            phases: HashMap::new(),
            by_type: HashMap::new(),
            filters: HashMap::new(),
            labelers: HashMap::new(),
            branches: HashMap::new(),
            labeled: HashMap::new(),
            counts: HashMap::new(),
        }
    }

    // ── reference counts ───────────────────────────────────────

    fn retain(&mut self, event_type: TypeId) {
        *self.counts.entry(event_type).or_insert(0) += 1;
    }

    fn release(&mut self, event_type: TypeId) {
        if let Some(n) = self.counts.get_mut(&event_type) {
            *n -= 1;
            if *n == 0 {
                self.counts.remove(&event_type);
            }
        }
    }

    /// Whether anything at all is subscribed to `event_type`.
    pub(crate) fn subscribers_exist(&self, event_type: TypeId) -> bool {
        self.counts.contains_key(&event_type)
    }

    // ── data managers ──────────────────────────────────────────

    /// Subscribe a data manager to one phase. Re-subscribing replaces the
    /// callback and keeps the original registration position.
    pub(crate) fn subscribe_phase(
        &mut self,
        event_type: TypeId,
        phase: EventPhase,
        dm: DataManagerId,
        callback: C,
    ) {
        let slots = self
            .phases
            .entry(event_type)
            .or_insert_with(|| [IndexMap::new(), IndexMap::new(), IndexMap::new()]);
        if slots[phase.index()].insert(dm, callback).is_none() {
            self.retain(event_type);
        }
    }

    /// Remove a data manager from every phase of `event_type`.
    pub(crate) fn unsubscribe_phases(&mut self, event_type: TypeId, dm: DataManagerId) {
        let Some(slots) = self.phases.get_mut(&event_type) else {
            return;
        };
        let removed = slots
            .iter_mut()
            .filter_map(|phase| phase.shift_remove(&dm))
            .count();
        if slots.iter().all(IndexMap::is_empty) {
            self.phases.remove(&event_type);
        }
        for _ in 0..removed {
            self.release(event_type);
        }
    }

    /// Data-manager callbacks for `event_type`: validation, then execution,
    /// then post-execution, each in registration order.
    pub(crate) fn phase_deliveries(&self, event_type: TypeId) -> Vec<(DataManagerId, C)> {
        let Some(slots) = self.phases.get(&event_type) else {
            return Vec::new();
        };
        EventPhase::ALL
            .iter()
            .flat_map(|phase| slots[phase.index()].iter())
            .map(|(dm, cb)| (*dm, cb.clone()))
            .collect()
    }

    // ── actors by type ─────────────────────────────────────────

    pub(crate) fn subscribe_type(&mut self, event_type: TypeId, actor: ActorId, callback: C) {
        if self
            .by_type
            .entry(event_type)
            .or_default()
            .insert(actor, callback)
            .is_none()
        {
            self.retain(event_type);
        }
    }

    pub(crate) fn unsubscribe_type(&mut self, event_type: TypeId, actor: ActorId) {
        let Some(subs) = self.by_type.get_mut(&event_type) else {
            return;
        };
        if subs.shift_remove(&actor).is_some() {
            if subs.is_empty() {
                self.by_type.remove(&event_type);
            }
            self.release(event_type);
        }
    }

    // ── actors by filter ───────────────────────────────────────

    pub(crate) fn subscribe_filter(
        &mut self,
        event_type: TypeId,
        actor: ActorId,
        signature: Signature,
        matcher: Matcher,
        callback: C,
    ) {
        let entries = self.filters.entry(event_type).or_default();
        if let Some(entry) = entries
            .iter_mut()
            .find(|e| e.actor == actor && e.signature == signature)
        {
            entry.matcher = matcher;
            entry.callback = callback;
            return;
        }
        entries.push(FilterEntry {
            actor,
            signature,
            matcher,
            callback,
        });
        self.retain(event_type);
    }

    pub(crate) fn unsubscribe_filter(
        &mut self,
        event_type: TypeId,
        actor: ActorId,
        signature: &Signature,
    ) {
        let Some(entries) = self.filters.get_mut(&event_type) else {
            return;
        };
        let before = entries.len();
        entries.retain(|e| !(e.actor == actor && e.signature == *signature));
        let removed = before - entries.len();
        if entries.is_empty() {
            self.filters.remove(&event_type);
        }
        for _ in 0..removed {
            self.release(event_type);
        }
    }

    // ── labelers and labels ────────────────────────────────────

    pub(crate) fn add_labeler(
        &mut self,
        event_type: TypeId,
        id: LabelerId,
        labeler: L,
    ) -> Result<(), ContractError> {
        if self.labelers.contains_key(&id) {
            return Err(ErrorKind::DuplicateEventLabeler { labeler: id }.into());
        }
        self.labelers.insert(id, (event_type, labeler));
        Ok(())
    }

    fn check_labeler(&self, slot: &LabelSlot) -> Result<(), ContractError> {
        match self.labelers.get(&slot.labeler) {
            None => Err(ErrorKind::UnknownEventLabeler {
                labeler: slot.labeler.clone(),
            }
            .into()),
            Some((event_type, _)) if *event_type != slot.event_type => {
                Err(ErrorKind::LabelerMismatch {
                    labeler: slot.labeler.clone(),
                    field: "event type",
                }
                .into())
            }
            Some(_) => Ok(()),
        }
    }

    pub(crate) fn subscribe_label(
        &mut self,
        slot: LabelSlot,
        actor: ActorId,
        callback: C,
    ) -> Result<(), ContractError> {
        self.check_labeler(&slot)?;
        let event_type = slot.event_type;
        let branch = (event_type, slot.primary.clone());
        let labeler = slot.labeler.clone();
        if self
            .labeled
            .entry(slot)
            .or_default()
            .insert(actor, callback)
            .is_none()
        {
            *self
                .branches
                .entry(branch)
                .or_default()
                .entry(labeler)
                .or_insert(0) += 1;
            self.retain(event_type);
        }
        Ok(())
    }

    pub(crate) fn unsubscribe_label(&mut self, slot: &LabelSlot, actor: ActorId) {
        let Some(subs) = self.labeled.get_mut(slot) else {
            return;
        };
        if subs.shift_remove(&actor).is_none() {
            return;
        }
        if subs.is_empty() {
            self.labeled.remove(slot);
        }
        let branch = (slot.event_type, slot.primary.clone());
        if let Some(labelers) = self.branches.get_mut(&branch) {
            if let Some(n) = labelers.get_mut(&slot.labeler) {
                *n -= 1;
                if *n == 0 {
                    labelers.shift_remove(&slot.labeler);
                }
            }
            if labelers.is_empty() {
                self.branches.remove(&branch);
            }
        }
        self.release(slot.event_type);
    }

    // ── actors ─────────────────────────────────────────────────

    /// Drop every subscription held by `actor`.
    pub(crate) fn remove_actor(&mut self, actor: ActorId) {
        let types: Vec<TypeId> = self
            .by_type
            .iter()
            .filter(|(_, subs)| subs.contains_key(&actor))
            .map(|(t, _)| *t)
            .collect();
        for t in types {
            self.unsubscribe_type(t, actor);
        }

        let filters: Vec<(TypeId, Signature)> = self
            .filters
            .iter()
            .flat_map(|(t, entries)| {
                entries
                    .iter()
                    .filter(|e| e.actor == actor)
                    .map(|e| (*t, e.signature.clone()))
            })
            .collect();
        for (t, sig) in filters {
            self.unsubscribe_filter(t, actor, &sig);
        }

        let slots: Vec<LabelSlot> = self
            .labeled
            .iter()
            .filter(|(_, subs)| subs.contains_key(&actor))
            .map(|(slot, _)| slot.clone())
            .collect();
        for slot in slots {
            self.unsubscribe_label(&slot, actor);
        }
    }

    /// Actor callbacks for one published event: class subscribers, then
    /// filter matches, then label matches.
    ///
    /// `label` evaluates a registered labeler against the event. A label
    /// whose labeler, primary key, or event type disagrees with the event
    /// is a [`ErrorKind::LabelerMismatch`].
    pub(crate) fn actor_deliveries(
        &self,
        event_type: TypeId,
        event: &dyn Any,
        primary: &Key,
        label: impl Fn(&L) -> Option<LabelSlot>,
    ) -> Result<Vec<(ActorId, C)>, ContractError> {
        let mut out = Vec::new();

        if let Some(subs) = self.by_type.get(&event_type) {
            out.extend(subs.iter().map(|(a, cb)| (*a, cb.clone())));
        }

        if let Some(entries) = self.filters.get(&event_type) {
            out.extend(
                entries
                    .iter()
                    .filter(|e| (e.matcher)(event))
                    .map(|e| (e.actor, e.callback.clone())),
            );
        }

        let Some(labelers) = self.branches.get(&(event_type, primary.clone())) else {
            return Ok(out);
        };
        for id in labelers.keys() {
            let Some((_, labeler)) = self.labelers.get(id) else {
                continue;
            };
            let mismatch = |field| -> ContractError {
                ErrorKind::LabelerMismatch {
                    labeler: id.clone(),
                    field,
                }
                .into()
            };
            let slot = label(labeler).ok_or_else(|| mismatch("event type"))?;
            if slot.event_type != event_type {
                return Err(mismatch("event type"));
            }
            if slot.labeler != *id {
                return Err(mismatch("labeler id"));
            }
            if slot.primary != *primary {
                return Err(mismatch("primary key"));
            }
            if let Some(subs) = self.labeled.get(&slot) {
                out.extend(subs.iter().map(|(a, cb)| (*a, cb.clone())));
            }
        }
        Ok(out)
    }

    /// Number of live index branches. Zero once every subscriber has left.
    #[cfg(test)]
    fn branch_count(&self) -> usize {
        self.phases.len()
            + self.by_type.len()
            + self.filters.len()
            + self.branches.len()
            + self.labeled.len()
            + self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nucleus_core::KeyTuple;

    struct Ping;
    struct Pong;

    type TestRouter = EventRouter<&'static str, fn(&dyn Any) -> Option<LabelSlot>>;

    fn ping() -> TypeId {
        TypeId::of::<Ping>()
    }

    fn slot(labeler: &str, primary: u32, key: u32) -> LabelSlot {
        LabelSlot {
            event_type: ping(),
            labeler: LabelerId::new(labeler),
            primary: Key::from(primary),
            keys: KeyTuple::from_iter([Key::from(key)]),
        }
    }

    fn label_seven(_: &dyn Any) -> Option<LabelSlot> {
        Some(slot("by_id", 0, 7))
    }

    fn names(deliveries: Vec<(ActorId, &'static str)>) -> Vec<&'static str> {
        deliveries.into_iter().map(|(_, n)| n).collect()
    }

    #[test]
    fn phases_deliver_in_fixed_order() {
        let mut r = TestRouter::new();
        r.subscribe_phase(ping(), EventPhase::PostExecution, DataManagerId(0), "post");
        r.subscribe_phase(ping(), EventPhase::Execution, DataManagerId(1), "exec1");
        r.subscribe_phase(ping(), EventPhase::Validation, DataManagerId(2), "valid");
        r.subscribe_phase(ping(), EventPhase::Execution, DataManagerId(3), "exec2");
        let order: Vec<_> = r.phase_deliveries(ping()).into_iter().map(|(_, n)| n).collect();
        assert_eq!(order, vec!["valid", "exec1", "exec2", "post"]);
        assert!(r.phase_deliveries(TypeId::of::<Pong>()).is_empty());
    }

    #[test]
    fn unsubscribing_a_data_manager_clears_all_phases() {
        let mut r = TestRouter::new();
        r.subscribe_phase(ping(), EventPhase::Validation, DataManagerId(0), "v");
        r.subscribe_phase(ping(), EventPhase::PostExecution, DataManagerId(0), "p");
        r.unsubscribe_phases(ping(), DataManagerId(0));
        assert!(!r.subscribers_exist(ping()));
        assert_eq!(r.branch_count(), 0);
    }

    #[test]
    fn actor_order_is_type_then_filter_then_label() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), label_seven)
            .unwrap();
        r.subscribe_label(slot("by_id", 0, 7), ActorId(0), "label").unwrap();
        r.subscribe_filter(ping(), ActorId(1), Vec::new(), Rc::new(|_| true), "filter");
        r.subscribe_type(ping(), ActorId(2), "type");
        let out = r
            .actor_deliveries(ping(), &Ping, &Key::from(0u32), |l| l(&Ping))
            .unwrap();
        assert_eq!(names(out), vec!["type", "filter", "label"]);
    }

    #[test]
    fn non_matching_label_and_filter_are_skipped() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), label_seven)
            .unwrap();
        r.subscribe_label(slot("by_id", 0, 8), ActorId(0), "label").unwrap();
        r.subscribe_filter(ping(), ActorId(1), Vec::new(), Rc::new(|_| false), "filter");
        let out = r
            .actor_deliveries(ping(), &Ping, &Key::from(0u32), |l| l(&Ping))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn labelers_outside_the_primary_partition_are_not_evaluated() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), |_| panic!("evaluated"))
            .unwrap();
        r.subscribe_label(slot("by_id", 1, 7), ActorId(0), "label").unwrap();
        let out = r
            .actor_deliveries(ping(), &Ping, &Key::from(0u32), |l| l(&Ping))
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn mismatched_primary_key_is_rejected() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), |_| Some(slot("by_id", 9, 7)))
            .unwrap();
        r.subscribe_label(slot("by_id", 0, 7), ActorId(0), "label").unwrap();
        let err = r
            .actor_deliveries(ping(), &Ping, &Key::from(0u32), |l| l(&Ping))
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::LabelerMismatch {
                labeler: LabelerId::new("by_id"),
                field: "primary key"
            }
        );
    }

    #[test]
    fn mismatched_labeler_id_is_rejected() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), |_| Some(slot("other", 0, 7)))
            .unwrap();
        r.subscribe_label(slot("by_id", 0, 7), ActorId(0), "label").unwrap();
        let err = r
            .actor_deliveries(ping(), &Ping, &Key::from(0u32), |l| l(&Ping))
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::LabelerMismatch { field: "labeler id", .. }
        ));
    }

    #[test]
    fn unknown_labeler_is_rejected_at_subscribe() {
        let mut r = TestRouter::new();
        let err = r
            .subscribe_label(slot("nope", 0, 1), ActorId(0), "label")
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnknownEventLabeler { .. }));
        assert!(!r.subscribers_exist(ping()));
    }

    #[test]
    fn labeler_for_another_type_is_rejected_at_subscribe() {
        let mut r = TestRouter::new();
        r.add_labeler(TypeId::of::<Pong>(), LabelerId::new("by_id"), label_seven)
            .unwrap();
        let err = r
            .subscribe_label(slot("by_id", 0, 7), ActorId(0), "label")
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::LabelerMismatch { field: "event type", .. }
        ));
    }

    #[test]
    fn duplicate_labeler_is_rejected() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), label_seven)
            .unwrap();
        let err = r
            .add_labeler(ping(), LabelerId::new("by_id"), label_seven)
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::DuplicateEventLabeler { .. }));
    }

    #[test]
    fn removing_an_actor_prunes_every_branch() {
        let mut r = TestRouter::new();
        r.add_labeler(ping(), LabelerId::new("by_id"), label_seven)
            .unwrap();
        let a = ActorId(3);
        r.subscribe_type(ping(), a, "t");
        r.subscribe_filter(ping(), a, vec![("x", Key::Unit)], Rc::new(|_| true), "f");
        r.subscribe_label(slot("by_id", 0, 7), a, "l").unwrap();
        r.subscribe_label(slot("by_id", 1, 2), a, "l2").unwrap();
        assert!(r.subscribers_exist(ping()));
        r.remove_actor(a);
        assert!(!r.subscribers_exist(ping()));
        assert_eq!(r.branch_count(), 0);
    }

    #[test]
    fn resubscribing_replaces_without_double_counting() {
        let mut r = TestRouter::new();
        r.subscribe_type(ping(), ActorId(0), "first");
        r.subscribe_type(ping(), ActorId(0), "second");
        let out = r
            .actor_deliveries(ping(), &Ping, &Key::Unit, |l| l(&Ping))
            .unwrap();
        assert_eq!(names(out), vec!["second"]);
        r.unsubscribe_type(ping(), ActorId(0));
        assert!(!r.subscribers_exist(ping()));
    }

    // ── proptest ───────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Clone, Debug)]
        enum Op {
            Type(u32),
            Filter(u32, u8),
            Label(u32, u8),
            Phase(u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..4).prop_map(Op::Type),
                (0u32..4, 0u8..3).prop_map(|(a, v)| Op::Filter(a, v)),
                (0u32..4, 0u8..3).prop_map(|(a, k)| Op::Label(a, k)),
                (0u32..4).prop_map(Op::Phase),
            ]
        }

        fn subscribe(r: &mut TestRouter, op: &Op) {
            match op {
                Op::Type(a) => r.subscribe_type(ping(), ActorId(*a), "t"),
                Op::Filter(a, v) => r.subscribe_filter(
                    ping(),
                    ActorId(*a),
                    vec![("v", Key::from(u32::from(*v)))],
                    Rc::new(|_| true),
                    "f",
                ),
                Op::Label(a, k) => r
                    .subscribe_label(slot("by_id", 0, u32::from(*k)), ActorId(*a), "l")
                    .unwrap(),
                Op::Phase(d) => {
                    r.subscribe_phase(ping(), EventPhase::Execution, DataManagerId(*d), "p")
                }
            }
        }

        fn unsubscribe(r: &mut TestRouter, op: &Op) {
            match op {
                Op::Type(a) => r.unsubscribe_type(ping(), ActorId(*a)),
                Op::Filter(a, v) => r.unsubscribe_filter(
                    ping(),
                    ActorId(*a),
                    &vec![("v", Key::from(u32::from(*v)))],
                ),
                Op::Label(a, k) => {
                    r.unsubscribe_label(&slot("by_id", 0, u32::from(*k)), ActorId(*a))
                }
                Op::Phase(d) => r.unsubscribe_phases(ping(), DataManagerId(*d)),
            }
        }

        proptest! {
            #[test]
            fn subscribe_unsubscribe_round_trip(ops in prop::collection::vec(op(), 1..40)) {
                let mut r = TestRouter::new();
                r.add_labeler(ping(), LabelerId::new("by_id"), label_seven).unwrap();
                prop_assert!(!r.subscribers_exist(ping()));
                for op in &ops {
                    subscribe(&mut r, op);
                    prop_assert!(r.subscribers_exist(ping()));
                }
                for op in ops.iter().rev() {
                    unsubscribe(&mut r, op);
                }
                prop_assert!(!r.subscribers_exist(ping()));
                prop_assert_eq!(r.branch_count(), 0);
            }
        }
    }
}
