//! Test plugins and output recorders for Nucleus development.
//!
//! Provides a closure-driven [`TestPlugin`] that registers scripted actors
//! and a scripted [`TestDataManager`], plus thread-safe recorders
//! ([`Trace`], [`OutputRecorder`]) for asserting on execution order and
//! released outputs.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use fixtures::{TestActorPlan, TestDataManager, TestDataManagerPlan, TestPlugin};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ordered log of labelled steps, shareable across plugin closures.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct Trace {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry.
    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    /// Snapshot of every entry so far.
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Position of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.entries).iter().position(|e| e == entry)
    }
}

/// Collects released outputs of one type.
///
/// [`consumer`](OutputRecorder::consumer) plugs into
/// `SimulationBuilder::output_consumer`; outputs of other types are
/// ignored.
pub struct OutputRecorder<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> OutputRecorder<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record one item directly.
    pub fn push(&self, item: T) {
        lock(&self.items).push(item);
    }

    /// Snapshot of every recorded item.
    pub fn items(&self) -> Vec<T> {
        lock(&self.items).clone()
    }

    /// Output consumer recording every released `T`.
    pub fn consumer(&self) -> impl FnMut(Box<dyn Any>) + 'static {
        let items = Arc::clone(&self.items);
        move |output: Box<dyn Any>| {
            if let Ok(item) = output.downcast::<T>() {
                lock(&items).push(*item);
            }
        }
    }
}

impl<T: Clone + Send + 'static> Default for OutputRecorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for OutputRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
        }
    }
}
