//! Time-ordered plan queue with lazy cancellation.
//!
//! [`PlanQueue`] holds every scheduled unit of work in a simulation. It
//! assigns monotonic arrival sequence numbers, tracks keyed plans per
//! owner, counts active plans, and yields plans in a strict order.
//!
//! # Ordering
//!
//! Plans are popped by the composite key:
//! `(time, kind, arrival_seq)`
//!
//! This ensures:
//! - Lower times execute first.
//! - At equal times, data-manager plans execute before actor plans.
//! - At equal time and kind, plans execute in insertion order.
//!
//! # Cancellation
//!
//! Removing a keyed plan evicts its record immediately but leaves the heap
//! entry in place. Stale heap entries are discarded when they surface at
//! the top of the heap, so removal never rewalks the queue.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use indexmap::IndexMap;
use nucleus_core::{ActorId, ContractError, DataManagerId, ErrorKind, Key};

/// The component that owns a plan.
///
/// Plan keys are scoped per owner: two owners may use the same key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Owner {
    /// A data manager.
    DataManager(DataManagerId),
    /// An actor.
    Actor(ActorId),
}

impl Owner {
    /// Tie-break rank: data managers before actors.
    fn rank(self) -> u8 {
        match self {
            Self::DataManager(_) => 0,
            Self::Actor(_) => 1,
        }
    }
}

/// Read-only description of a queued plan.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanInfo {
    /// Scheduled simulation time.
    pub time: f64,
    /// Whether the plan keeps the simulation alive.
    pub active: bool,
    /// The plan key, if the plan is keyed.
    pub key: Option<Key>,
}

/// A queued plan together with its payload.
#[derive(Debug)]
pub struct PlanRecord<P> {
    /// Scheduled simulation time.
    pub time: f64,
    /// Owning component.
    pub owner: Owner,
    /// Optional per-owner key.
    pub key: Option<Key>,
    /// Whether the plan counts toward the active-plan total.
    pub active: bool,
    /// Monotonic insertion sequence.
    pub arrival_seq: u64,
    /// The work to run.
    pub payload: P,
}

impl<P> PlanRecord<P> {
    fn info(&self) -> PlanInfo {
        PlanInfo {
            time: self.time,
            active: self.active,
            key: self.key.clone(),
        }
    }
}

/// Heap entry. Carries only the ordering key; the record lives in a map.
#[derive(Clone, Copy, Debug)]
struct Slot {
    time: f64,
    rank: u8,
    arrival_seq: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.rank.cmp(&other.rank))
            .then(self.arrival_seq.cmp(&other.arrival_seq))
    }
}

/// Priority queue of plans.
///
/// Generic over the payload so the ordering and bookkeeping rules can be
/// exercised without a running simulation.
pub struct PlanQueue<P> {
    heap: BinaryHeap<Reverse<Slot>>,
    records: HashMap<u64, PlanRecord<P>>,
    /// Live keyed plans per owner, in insertion order. Owners holding no
    /// keys have no entry.
    keys: HashMap<Owner, IndexMap<Key, u64>>,
    next_arrival_seq: u64,
    active_count: usize,
}

impl<P> PlanQueue<P> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            records: HashMap::new(),
            keys: HashMap::new(),
            next_arrival_seq: 0,
            active_count: 0,
        }
    }

    /// Schedule a plan.
    ///
    /// Fails with [`ErrorKind::InvalidPlanTime`] for NaN times,
    /// [`ErrorKind::PastPlanningTime`] when `time < now`, and
    /// [`ErrorKind::DuplicatePlanKey`] when `owner` already holds `key`.
    /// Returns the assigned arrival sequence number.
    pub fn add(
        &mut self,
        now: f64,
        owner: Owner,
        time: f64,
        key: Option<Key>,
        active: bool,
        payload: P,
    ) -> Result<u64, ContractError> {
        if time.is_nan() {
            return Err(ErrorKind::InvalidPlanTime { plan_time: time }.into());
        }
        if time < now {
            return Err(ErrorKind::PastPlanningTime {
                plan_time: time,
                current_time: now,
            }
            .into());
        }
        if let Some(k) = &key {
            if self.seq_of(owner, k).is_some() {
                return Err(ErrorKind::DuplicatePlanKey { key: k.clone() }.into());
            }
        }

        let arrival_seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;

        if let Some(k) = &key {
            self.keys
                .entry(owner)
                .or_default()
                .insert(k.clone(), arrival_seq);
        }
        if active {
            self.active_count += 1;
        }
        self.heap.push(Reverse(Slot {
            time,
            rank: owner.rank(),
            arrival_seq,
        }));
        self.records.insert(
            arrival_seq,
            PlanRecord {
                time,
                owner,
                key,
                active,
                arrival_seq,
                payload,
            },
        );
        Ok(arrival_seq)
    }

    fn seq_of(&self, owner: Owner, key: &Key) -> Option<u64> {
        self.keys.get(&owner)?.get(key).copied()
    }

    /// Forget `owner`'s `key`, dropping the owner's entry once empty.
    fn release_key(&mut self, owner: Owner, key: &Key) -> Option<u64> {
        let held = self.keys.get_mut(&owner)?;
        let seq = held.shift_remove(key);
        if held.is_empty() {
            self.keys.remove(&owner);
        }
        seq
    }

    /// Look up a keyed plan.
    pub fn get(&self, owner: Owner, key: &Key) -> Option<PlanInfo> {
        let seq = self.seq_of(owner, key)?;
        self.records.get(&seq).map(PlanRecord::info)
    }

    /// Scheduled time of a keyed plan.
    pub fn time_of(&self, owner: Owner, key: &Key) -> Option<f64> {
        self.get(owner, key).map(|info| info.time)
    }

    /// Cancel a keyed plan, returning its description.
    ///
    /// Returns `None` when no such plan exists. The heap entry is left in
    /// place and skipped when popped.
    pub fn remove(&mut self, owner: Owner, key: &Key) -> Option<PlanInfo> {
        let seq = self.release_key(owner, key)?;
        let record = self.records.remove(&seq)?;
        if record.active {
            self.active_count -= 1;
        }
        Some(record.info())
    }

    /// Keys currently held by `owner`, in insertion order.
    pub fn keys(&self, owner: Owner) -> Vec<Key> {
        self.keys
            .get(&owner)
            .map(|held| held.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Time of the next live plan, discarding stale heap entries.
    pub fn peek_time(&mut self) -> Option<f64> {
        self.discard_stale();
        self.heap.peek().map(|Reverse(slot)| slot.time)
    }

    /// Remove and return the next live plan.
    pub fn pop(&mut self) -> Option<PlanRecord<P>> {
        while let Some(Reverse(slot)) = self.heap.pop() {
            let Some(record) = self.records.remove(&slot.arrival_seq) else {
                continue;
            };
            if let Some(k) = &record.key {
                self.release_key(record.owner, k);
            }
            if record.active {
                self.active_count -= 1;
            }
            return Some(record);
        }
        None
    }

    /// Number of live plans flagged active.
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Number of live plans, active and passive.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no live plans remain.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse(slot)) = self.heap.peek() {
            if self.records.contains_key(&slot.arrival_seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<P> Default for PlanQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
