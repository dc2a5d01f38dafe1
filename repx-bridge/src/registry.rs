use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::subscriber::{Subscriber, SubscriberId};

type SubscriberMap = HashMap<SubscriberId, Arc<dyn Subscriber>>;

/// The set of live subscribers.
///
/// All access goes through `register`, `unregister`, `snapshot` and `clear`.
/// The lock is only held to mutate or copy the membership, never across a
/// send.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<SubscriberMap>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Replaces any entry with the same id.
    pub fn register(&self, subscriber: Arc<dyn Subscriber>) {
        let id = subscriber.id();
        self.lock().insert(id, subscriber);
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Copy of the current membership for iteration outside the lock.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every subscriber. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut map = self.lock();
        let count = map.len();
        map.clear();
        count
    }

    // Mutations are single insert/remove calls, so a poisoned map is still
    // consistent.
    fn lock(&self) -> MutexGuard<'_, SubscriberMap> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
