//! Topic management
//!
//! A `Topic` holds the handlers registered for one topic name in
//! registration order. Each entry carries the id handed out at subscribe
//! time so removal targets exactly one registration, even when the same
//! closure was registered twice.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the router
//! keeps every topic behind its registry lock).

use std::sync::Arc;

use crate::router::subscription::SubscriptionId;

struct Entry<H: ?Sized> {
    id: SubscriptionId,
    handler: Arc<H>,
}

pub struct Topic<H: ?Sized> {
    pub name: String,
    entries: Vec<Entry<H>>,
}

impl<H: ?Sized> Topic<H> {
    /// Create a new topic with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    /// Append a handler; it will run after every handler already registered.
    pub fn subscribe(&mut self, id: SubscriptionId, handler: Arc<H>) {
        self.entries.push(Entry { id, handler });
    }

    /// Remove the registration with `id`. Returns whether anything was removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    /// Clones the current handler list so dispatch can run without the lock.
    pub fn snapshot(&self) -> Vec<Arc<H>> {
        self.entries.iter().map(|entry| entry.handler.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
