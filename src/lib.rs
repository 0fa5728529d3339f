//! # realtime-mux
//!
//! `realtime_mux` is the real-time client for the channel operations
//! dashboard. It keeps one websocket connection to the realtime hub and
//! multiplexes it into topic-keyed publish/subscribe channels consumed by
//! many independent parts of an application.
//!
//! ## Core Modules
//!
//! - `transport`: the wire envelope, backoff policy, connection status and websocket session.
//! - `router`: the subscription registry and fan-out of inbound envelopes.
//! - `client`: `RealtimeClient`, the connection context (connect, reconnect, send, subscribe).
//! - `adapters`: chat, notification and stream health state built on the client.
//! - `config`: loading settings from file and environment.
//! - `utils`: error types and logging setup.
//!
//! ## Example
//!
//! ```no_run
//! use realtime_mux::{RealtimeClient, config::ConnectionSettings};
//!
//! # async fn run() -> realtime_mux::Result<()> {
//! let client = RealtimeClient::new(&ConnectionSettings::default())?;
//! client.set_auth_token(Some("bearer-token".to_string()));
//! let sub = client.subscribe("chat.message", |envelope| {
//!     println!("{}: {}", envelope.topic, envelope.payload);
//! });
//! client.connect();
//! // ...
//! sub.unsubscribe();
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod client;
pub mod config;
pub mod router;
pub mod transport;
pub mod utils;

pub use client::RealtimeClient;
pub use router::{Router, Subscription};
pub use transport::{ConnectionStatus, Envelope, TypedEnvelope};
pub use utils::{Error, Result};
