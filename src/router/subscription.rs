//! Subscription handles
//!
//! A `Subscription` is returned by every registration (topic handlers,
//! catch-all handlers, status listeners). It captures the exact registry
//! entry it created, so `unsubscribe` removes that entry and nothing else.
//! Calling it again, or after the registry itself is gone, does nothing.
//!
//! Dropping a `Subscription` does not unregister; call `unsubscribe`
//! explicitly (the consumer adapters do this in their `Drop`).

use std::fmt;
use std::sync::Mutex;

/// Unique per registry; never reused.
pub type SubscriptionId = u64;

type Remover = Box<dyn FnOnce() + Send>;

pub struct Subscription {
    id: SubscriptionId,
    remover: Mutex<Option<Remover>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, remover: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            remover: Mutex::new(Some(Box::new(remover))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes this registration. Idempotent.
    pub fn unsubscribe(&self) {
        let remover = self
            .remover
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        // run outside the handle lock; the remover takes the registry lock
        if let Some(remove) = remover {
            remove();
        }
    }

    pub fn is_active(&self) -> bool {
        self.remover
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
