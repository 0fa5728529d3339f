//! Notification feed adapter
//!
//! Keeps the newest `notification_limit` notifications (newest first) and an
//! unread counter. Evicting an old unread notification does not change the
//! counter, since the server still considers it unread; its id is remembered
//! so that exactly one later read event counts it down. Reads for ids the
//! feed never counted, or already counted as read, change nothing.
//!
//! Several feeds may share one client. The server-side subscription is
//! withdrawn only when the last `notification.new` handler on the client goes
//! away.
//!
//! Inbound: `notification.new`, `notification.update`, `notification.bulk_read`.
//! Outbound: `notification.subscribe`, `notification.unsubscribe`,
//! `notification.read`, `notification.read_all`.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::adapters::{announce_on_connect, lock};
use crate::client::RealtimeClient;
use crate::config::AdapterSettings;
use crate::router::Subscription;
use crate::transport::TypedEnvelope;

pub const NOTIFICATION_NEW: &str = "notification.new";
pub const NOTIFICATION_UPDATE: &str = "notification.update";
pub const NOTIFICATION_BULK_READ: &str = "notification.bulk_read";
pub const NOTIFICATION_SUBSCRIBE: &str = "notification.subscribe";
pub const NOTIFICATION_UNSUBSCRIBE: &str = "notification.unsubscribe";
pub const NOTIFICATION_READ: &str = "notification.read";
pub const NOTIFICATION_READ_ALL: &str = "notification.read_all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationUpdate {
    pub id: String,
    #[serde(default)]
    pub read: Option<bool>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// `ids: None` marks every notification read.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BulkRead {
    #[serde(default)]
    pub ids: Option<Vec<String>>,
}

/// Unread count = unread retained items + `evicted_unread`.
#[derive(Debug)]
struct FeedState {
    items: VecDeque<Notification>,
    /// Ids of unread notifications pushed out of `items`.
    evicted_unread: HashSet<String>,
    limit: usize,
}

impl FeedState {
    fn insert(&mut self, notification: Notification) {
        if let Some(existing) = self.items.iter_mut().find(|n| n.id == notification.id) {
            *existing = notification;
            return;
        }
        self.evicted_unread.remove(&notification.id);
        self.items.push_front(notification);
        while self.items.len() > self.limit {
            if let Some(evicted) = self.items.pop_back() {
                if !evicted.read {
                    self.evicted_unread.insert(evicted.id);
                }
            }
        }
    }

    fn set_read(&mut self, id: &str, read: bool) {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(notification) => notification.read = read,
            None if read => {
                self.evicted_unread.remove(id);
            }
            None => {}
        }
    }

    fn read_all(&mut self) {
        for notification in &mut self.items {
            notification.read = true;
        }
        self.evicted_unread.clear();
    }

    fn unread(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count() + self.evicted_unread.len()
    }
}

pub struct NotificationFeed {
    client: RealtimeClient,
    state: Arc<Mutex<FeedState>>,
    subscriptions: Vec<Subscription>,
}

impl NotificationFeed {
    pub fn subscribe(client: &RealtimeClient, settings: &AdapterSettings) -> Self {
        let state = Arc::new(Mutex::new(FeedState {
            items: VecDeque::with_capacity(settings.notification_limit),
            evicted_unread: HashSet::new(),
            limit: settings.notification_limit,
        }));

        let on_new = {
            let state = state.clone();
            client.subscribe_typed(NOTIFICATION_NEW, move |envelope: TypedEnvelope<Notification>| {
                lock(&state).insert(envelope.payload);
            })
        };

        let on_update = {
            let state = state.clone();
            client.subscribe_typed(
                NOTIFICATION_UPDATE,
                move |envelope: TypedEnvelope<NotificationUpdate>| {
                    let update = envelope.payload;
                    let mut state = lock(&state);
                    if let Some(existing) = state.items.iter_mut().find(|n| n.id == update.id) {
                        if let Some(title) = update.title {
                            existing.title = title;
                        }
                        if update.body.is_some() {
                            existing.body = update.body;
                        }
                    }
                    if let Some(read) = update.read {
                        state.set_read(&update.id, read);
                    }
                },
            )
        };

        let on_bulk_read = {
            let state = state.clone();
            client.subscribe_typed(NOTIFICATION_BULK_READ, move |envelope: TypedEnvelope<BulkRead>| {
                let mut state = lock(&state);
                match envelope.payload.ids {
                    Some(ids) => ids.iter().for_each(|id| state.set_read(id, true)),
                    None => state.read_all(),
                }
            })
        };

        let on_connect = announce_on_connect(client, |client| {
            client.send(NOTIFICATION_SUBSCRIBE, json!({}));
        });

        Self {
            client: client.clone(),
            state,
            subscriptions: vec![on_new, on_update, on_bulk_read, on_connect],
        }
    }

    /// Retained notifications, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).items.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> usize {
        lock(&self.state).unread()
    }

    /// Marks one notification read locally and tells the server. Returns
    /// whether the command was handed to the transport.
    pub fn mark_read(&self, id: &str) -> bool {
        lock(&self.state).set_read(id, true);
        self.client.send(NOTIFICATION_READ, json!({ "id": id }))
    }

    pub fn mark_all_read(&self) -> bool {
        lock(&self.state).read_all();
        self.client.send(NOTIFICATION_READ_ALL, json!({}))
    }
}

impl Drop for NotificationFeed {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        if self.client.router().subscriber_count(NOTIFICATION_NEW) == 0 {
            self.client.send(NOTIFICATION_UNSUBSCRIBE, json!({}));
        }
    }
}
