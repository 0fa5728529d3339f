//! Consumer adapters
//!
//! Small state accumulators built only on the public `RealtimeClient`
//! contract (`subscribe`, `send`, `on_status_change`). Each one keeps a
//! bounded local view of one product feed:
//! - `chat`: recent messages of one live chat, with moderation tombstones
//! - `notifications`: the notification feed and its unread counter
//! - `stream_health`: latest health snapshot and recent alerts per stream
//!
//! Adapters announce their interest to the server (join/subscribe command)
//! whenever the client reaches `Connected`, and withdraw it plus all their
//! registrations when dropped.

pub mod chat;
pub mod notifications;
pub mod stream_health;

pub use chat::ChatRoom;
pub use notifications::NotificationFeed;
pub use stream_health::StreamHealthMonitor;

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::client::RealtimeClient;
use crate::router::Subscription;
use crate::transport::ConnectionStatus;

/// Appends `item`, dropping the oldest entries beyond `limit`.
pub(crate) fn push_bounded<T>(items: &mut VecDeque<T>, item: T, limit: usize) {
    items.push_back(item);
    while items.len() > limit {
        items.pop_front();
    }
}

pub(crate) fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `announce` now if the client is connected, and again every time it
/// (re)connects.
pub(crate) fn announce_on_connect<F>(client: &RealtimeClient, announce: F) -> Subscription
where
    F: Fn(&RealtimeClient) + Send + Sync + 'static,
{
    if client.status() == ConnectionStatus::Connected {
        announce(client);
    }
    let handle = client.clone();
    client.on_status_change(move |status| {
        if status == ConnectionStatus::Connected {
            announce(&handle);
        }
    })
}

#[cfg(test)]
mod tests;
