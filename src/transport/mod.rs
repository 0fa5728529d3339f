//! The `transport` module is responsible for the wire side of the realtime
//! connection.
//!
//! It defines the envelope exchanged with the server, the reconnect backoff
//! policy, the connection status model, and the websocket session itself.

pub mod backoff;
pub mod message;
pub mod status;
pub mod websocket;

pub use backoff::Backoff;
pub use message::{Envelope, TypedEnvelope};
pub use status::{ConnectionStatus, StatusListeners};
