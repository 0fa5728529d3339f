//! Wire envelope
//!
//! Every frame on the realtime socket is one JSON `Envelope`:
//!
//! ```json
//! { "type": "chat.message", "payload": { ... }, "id": "<uuid>", "timestamp": "<rfc3339>" }
//! ```
//!
//! - `type` is the routing key and must be non-empty
//! - `payload` is opaque to the router; handlers decode it themselves
//! - `id` and `timestamp` are informational only. Inbound frames that omit
//!   them get a fresh id and the local receive time.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::utils::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "new_envelope_id")]
    pub id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

fn new_envelope_id() -> String {
    Uuid::new_v4().to_string()
}

impl Envelope {
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            id: new_envelope_id(),
            timestamp: Utc::now(),
        }
    }

    /// Parses one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(frame)?;
        if envelope.topic.is_empty() {
            return Err(Error::EmptyTopic);
        }
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes the payload into a consumer-chosen type.
    pub fn typed<T: DeserializeOwned>(&self) -> Result<TypedEnvelope<T>> {
        Ok(TypedEnvelope {
            topic: self.topic.clone(),
            payload: T::deserialize(&self.payload)?,
            id: self.id.clone(),
            timestamp: self.timestamp,
        })
    }
}

/// An `Envelope` whose payload has been decoded into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedEnvelope<T> {
    pub topic: String,
    pub payload: T,
    pub id: String,
    pub timestamp: DateTime<Utc>,
}
