//! Live chat adapter
//!
//! A `ChatRoom` follows the chat of one live event. It keeps the most recent
//! `chat_history_limit` messages (oldest dropped first) and applies
//! moderation events in place: a deleted or hidden message stays in the
//! history with `deleted = true` so the UI can render a tombstone.
//!
//! Inbound: `chat.message`, `chat.moderation`, `chat.status`, filtered by
//! `eventId`. Outbound: `chat.join`, `chat.leave`, `chat.send`,
//! `chat.moderate`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::adapters::{announce_on_connect, lock, push_bounded};
use crate::client::RealtimeClient;
use crate::config::AdapterSettings;
use crate::router::Subscription;
use crate::transport::TypedEnvelope;

pub const CHAT_MESSAGE: &str = "chat.message";
pub const CHAT_MODERATION: &str = "chat.moderation";
pub const CHAT_STATUS: &str = "chat.status";
pub const CHAT_JOIN: &str = "chat.join";
pub const CHAT_LEAVE: &str = "chat.leave";
pub const CHAT_SEND: &str = "chat.send";
pub const CHAT_MODERATE: &str = "chat.moderate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub event_id: String,
    pub message: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationAction {
    Delete,
    Hide,
    Timeout,
    Ban,
    #[serde(other)]
    Unknown,
}

impl ModerationAction {
    /// Whether the targeted message should be tombstoned.
    pub fn removes_message(self) -> bool {
        matches!(self, Self::Delete | Self::Hide)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationEvent {
    pub event_id: String,
    pub message_id: String,
    pub action: ModerationAction,
    #[serde(default)]
    pub moderator_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    pub event_id: String,
    pub status: String,
    #[serde(default)]
    pub slow_mode_secs: Option<u32>,
    #[serde(default)]
    pub participant_count: Option<u64>,
}

#[derive(Debug)]
struct ChatState {
    messages: VecDeque<ChatMessage>,
    status: Option<ChatStatus>,
    limit: usize,
}

impl ChatState {
    fn tombstone(&mut self, message_id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.deleted = true;
                true
            }
            None => false,
        }
    }
}

pub struct ChatRoom {
    client: RealtimeClient,
    event_id: String,
    state: Arc<Mutex<ChatState>>,
    subscriptions: Vec<Subscription>,
}

impl ChatRoom {
    pub fn join(client: &RealtimeClient, event_id: impl Into<String>, settings: &AdapterSettings) -> Self {
        let event_id: String = event_id.into();
        let state = Arc::new(Mutex::new(ChatState {
            messages: VecDeque::with_capacity(settings.chat_history_limit),
            status: None,
            limit: settings.chat_history_limit,
        }));

        let on_message = {
            let state = state.clone();
            let event_id = event_id.clone();
            client.subscribe_typed(CHAT_MESSAGE, move |envelope: TypedEnvelope<ChatMessage>| {
                let message = envelope.payload;
                if message.event_id != event_id {
                    return;
                }
                let mut state = lock(&state);
                let limit = state.limit;
                push_bounded(&mut state.messages, message, limit);
            })
        };

        let on_moderation = {
            let state = state.clone();
            let event_id = event_id.clone();
            client.subscribe_typed(CHAT_MODERATION, move |envelope: TypedEnvelope<ModerationEvent>| {
                let event = envelope.payload;
                if event.event_id != event_id || !event.action.removes_message() {
                    return;
                }
                if !lock(&state).tombstone(&event.message_id) {
                    debug!(message_id = %event.message_id, "moderated message not in history");
                }
            })
        };

        let on_status = {
            let state = state.clone();
            let event_id = event_id.clone();
            client.subscribe_typed(CHAT_STATUS, move |envelope: TypedEnvelope<ChatStatus>| {
                if envelope.payload.event_id == event_id {
                    lock(&state).status = Some(envelope.payload);
                }
            })
        };

        let on_connect = {
            let event_id = event_id.clone();
            announce_on_connect(client, move |client| {
                client.send(CHAT_JOIN, json!({ "eventId": event_id }));
            })
        };

        Self {
            client: client.clone(),
            event_id,
            state,
            subscriptions: vec![on_message, on_moderation, on_status, on_connect],
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.iter().cloned().collect()
    }

    pub fn status(&self) -> Option<ChatStatus> {
        lock(&self.state).status.clone()
    }

    pub fn send_message(&self, message: &str) -> bool {
        self.client.send(
            CHAT_SEND,
            json!({ "eventId": self.event_id, "message": message }),
        )
    }

    pub fn moderate(&self, message_id: &str, action: ModerationAction, reason: Option<&str>) -> bool {
        self.client.send(
            CHAT_MODERATE,
            json!({
                "eventId": self.event_id,
                "messageId": message_id,
                "action": action,
                "reason": reason,
            }),
        )
    }

    /// Leaves the room; same as dropping it.
    pub fn leave(self) {}
}

impl Drop for ChatRoom {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.client
            .send(CHAT_LEAVE, json!({ "eventId": self.event_id }));
    }
}
