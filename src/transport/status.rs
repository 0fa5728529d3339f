//! Connection status and status listeners.
//!
//! Every status change carries a sequence number taken under the client's
//! state lock. `notify` queues the change and the first caller drains the
//! queue, so listeners see changes one at a time in sequence order even
//! when a listener (or another thread) changes the status mid-delivery.
//! A change that arrives after a newer one was already delivered is dropped.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;

use crate::router::engine::guarded;
use crate::router::subscription::{Subscription, SubscriptionId};
use crate::router::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

pub type StatusListener = dyn Fn(ConnectionStatus) + Send + Sync;

struct Listeners {
    next_id: SubscriptionId,
    topic: Topic<StatusListener>,
    pending: VecDeque<(u64, ConnectionStatus)>,
    delivered: u64,
    draining: bool,
}

/// Registry of status-change callbacks. Same removal contract as router
/// subscriptions.
#[derive(Clone)]
pub struct StatusListeners {
    inner: Arc<Mutex<Listeners>>,
}

impl Default for StatusListeners {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Listeners {
                next_id: 1,
                topic: Topic::new("status"),
                pending: VecDeque::new(),
                delivered: 0,
                draining: false,
            })),
        }
    }
}

impl StatusListeners {
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = self.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.topic.subscribe(id, Arc::new(listener));
            id
        };

        let inner: Weak<Mutex<Listeners>> = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .topic
                    .unsubscribe(id);
            }
        })
    }

    /// Delivers status change `seq` to every listener, in registration order.
    ///
    /// If a delivery is already running (on this thread through a listener,
    /// or on another thread) the change is queued and that delivery picks it
    /// up before returning.
    pub fn notify(&self, seq: u64, status: ConnectionStatus) {
        {
            let mut listeners = self.lock();
            listeners.pending.push_back((seq, status));
            if listeners.draining {
                return;
            }
            listeners.draining = true;
        }

        loop {
            let (status, snapshot) = {
                let mut listeners = self.lock();
                let Some((seq, status)) = listeners.pending.pop_front() else {
                    listeners.draining = false;
                    return;
                };
                if seq <= listeners.delivered {
                    continue;
                }
                listeners.delivered = seq;
                (status, listeners.topic.snapshot())
            };
            for listener in &snapshot {
                guarded("connection.status", || listener(status));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().topic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
