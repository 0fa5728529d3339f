//! Router engine
//!
//! The router owns the subscription registry and fans decoded envelopes out
//! to every interested handler:
//! - handlers registered for the envelope's exact topic run first, in
//!   registration order
//! - then every catch-all handler registered with `subscribe_all`
//!
//! Concurrency and usage notes:
//! - `Router` is a cheap clonable handle around `Arc<Mutex<Registry>>`.
//! - Dispatch snapshots the handler list and releases the lock before
//!   invoking anything, so a handler may subscribe or unsubscribe (itself
//!   included) while being called. Such changes apply from the next envelope.
//! - Each invocation runs under `catch_unwind`; a panicking handler is
//!   logged with its topic and does not affect its siblings or the router.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::router::subscription::{Subscription, SubscriptionId};
use crate::router::topic::Topic;
use crate::transport::message::{Envelope, TypedEnvelope};

pub type Handler = dyn Fn(&Envelope) + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Key {
    Topic(String),
    All,
}

struct Registry {
    next_id: SubscriptionId,
    topics: HashMap<String, Topic<Handler>>,
    all: Topic<Handler>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            next_id: 1,
            topics: HashMap::new(),
            all: Topic::new("*"),
        }
    }
}

impl Registry {
    fn remove(&mut self, key: &Key, id: SubscriptionId) -> bool {
        match key {
            Key::All => self.all.unsubscribe(id),
            Key::Topic(name) => {
                let Some(topic) = self.topics.get_mut(name) else {
                    return false;
                };
                let removed = topic.unsubscribe(id);
                if topic.is_empty() {
                    self.topics.remove(name);
                }
                removed
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct Router {
    registry: Arc<Mutex<Registry>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for envelopes whose topic equals `topic`.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.register(Key::Topic(topic.to_string()), Arc::new(handler))
    }

    /// Like `subscribe`, but decodes the payload into `T` first. Envelopes
    /// whose payload does not decode are logged and skipped for this handler
    /// only.
    pub fn subscribe_typed<T, F>(&self, topic: &str, handler: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(TypedEnvelope<T>) + Send + Sync + 'static,
    {
        self.subscribe(topic, move |envelope| match envelope.typed::<T>() {
            Ok(typed) => handler(typed),
            Err(e) => warn!(
                topic = %envelope.topic,
                id = %envelope.id,
                "payload does not match subscriber type: {e}"
            ),
        })
    }

    /// Registers `handler` for every decoded envelope regardless of topic.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.register(Key::All, Arc::new(handler))
    }

    fn register(&self, key: Key, handler: Arc<Handler>) -> Subscription {
        let id = {
            let mut registry = self.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            match &key {
                Key::All => registry.all.subscribe(id, handler),
                Key::Topic(name) => registry
                    .topics
                    .entry(name.clone())
                    .or_insert_with(|| Topic::new(name))
                    .subscribe(id, handler),
            }
            id
        };
        debug!(?key, id, "subscribed");

        let registry: Weak<Mutex<Registry>> = Arc::downgrade(&self.registry);
        Subscription::new(id, move || {
            if let Some(registry) = registry.upgrade() {
                let removed = registry
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .remove(&key, id);
                debug!(?key, id, removed, "unsubscribed");
            }
        })
    }

    /// Decodes one raw inbound frame and dispatches it. A frame that does not
    /// decode is logged and dropped. Returns the number of handlers that ran
    /// to completion.
    pub fn dispatch_frame(&self, frame: &str) -> usize {
        match Envelope::decode(frame) {
            Ok(envelope) => self.dispatch(&envelope),
            Err(e) => {
                warn!(
                    "dropping undecodable frame: {e} | {}",
                    frame.chars().take(100).collect::<String>()
                );
                0
            }
        }
    }

    /// Delivers `envelope` to its topic's handlers, then to the catch-all
    /// handlers. Returns the number of handlers that ran to completion.
    pub fn dispatch(&self, envelope: &Envelope) -> usize {
        let handlers: Vec<Arc<Handler>> = {
            let registry = self.lock();
            let mut handlers = registry
                .topics
                .get(&envelope.topic)
                .map(Topic::snapshot)
                .unwrap_or_default();
            handlers.extend(registry.all.snapshot());
            handlers
        };

        if handlers.is_empty() {
            debug!(topic = %envelope.topic, "no subscribers");
            return 0;
        }

        let mut delivered = 0;
        for handler in &handlers {
            if guarded(&envelope.topic, || handler(envelope)) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of handlers registered for exactly `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().topics.get(topic).map_or(0, Topic::len)
    }

    pub fn catch_all_count(&self) -> usize {
        self.lock().all.len()
    }

    /// Topics that currently have at least one handler.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().topics.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Runs one subscriber callback, containing any panic. Returns whether the
/// callback completed.
pub(crate) fn guarded(label: &str, callback: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(panic) => {
            error!(
                topic = label,
                "subscriber panicked: {}",
                panic_message(panic.as_ref())
            );
            false
        }
    }
}

fn panic_message<'a>(panic: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
