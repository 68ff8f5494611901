//! Capacity-bounded map from a state id to a single-resolution future.
//!
//! The event pump resolves entries; a waiter that learned the outcome by
//! polling settles its entry instead. Any number of callers may wait on
//! them. Looking up the same unresolved key twice hands back the same
//! underlying future, so concurrent waiters on one state coalesce.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::watch;

/// A handle on one registry entry. Cloning it does not create a new future.
#[derive(Debug)]
pub struct StateFuture<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for StateFuture<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Clone> StateFuture<T> {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Wait until the entry is resolved and return its value.
    pub async fn wait(&self) -> T {
        let mut rx = self.slot.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close while
            // we are waiting on it.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Whether two handles refer to the same underlying future.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    fn resolve(&self, value: T) -> bool {
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(value);
            true
        })
    }
}

/// What [`FuturesRegistry::resolve`] did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    /// The entry already held a value.
    Duplicate,
    /// The key was completed and removed earlier; the value was dropped.
    Stale,
}

#[derive(Debug)]
pub struct FuturesRegistry<T> {
    capacity: usize,
    entries: HashMap<String, StateFuture<T>>,
    // insertion order, oldest first
    order: VecDeque<String>,
    completed: HashSet<String>,
    completed_order: VecDeque<String>,
}

impl<T: Clone> FuturesRegistry<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
            completed: HashSet::new(),
            completed_order: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Return the live future for `key`, creating it if absent. Creating an
    /// entry in a full registry evicts the oldest one first; anyone still
    /// waiting on the evicted entry is orphaned.
    pub fn get(&mut self, key: &str) -> StateFuture<T> {
        if let Some(existing) = self.entries.get(key) {
            return existing.clone();
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                tracing::debug!(state_id = %oldest, "evicting oldest state future");
            }
        }
        let future = StateFuture::new();
        self.entries.insert(key.to_owned(), future.clone());
        self.order.push_back(key.to_owned());
        future
    }

    /// Drop the entry for `key` if present and remember it as completed, so
    /// a redelivered event for it is not kept around.
    pub fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_none() {
            return;
        }
        self.order.retain(|k| k != key);
        if self.completed.insert(key.to_owned()) {
            self.completed_order.push_back(key.to_owned());
            while self.completed_order.len() > self.capacity {
                if let Some(old) = self.completed_order.pop_front() {
                    self.completed.remove(&old);
                }
            }
        }
    }

    /// Hand `value` to everyone still waiting on `key`, then remove the
    /// entry. Used when the outcome was learned without a push event, so
    /// coalesced waiters finish with the same answer.
    pub(crate) fn settle(&mut self, key: &str, value: T) {
        if let Some(entry) = self.entries.get(key) {
            entry.resolve(value);
        }
        self.remove(key);
    }

    /// Resolve the entry for `key`, creating it first when no waiter has
    /// registered yet. Must only be called by the single pump task.
    pub(crate) fn resolve(&mut self, key: &str, value: T) -> Resolution {
        if !self.entries.contains_key(key) && self.completed.contains(key) {
            return Resolution::Stale;
        }
        if self.get(key).resolve(value) {
            Resolution::Resolved
        } else {
            Resolution::Duplicate
        }
    }
}
