//! The `client` module holds `RealtimeClient`, the connection context shared
//! by every consumer in an application session.
//!
//! It owns the connection lifecycle (status, auth token, reconnect loop) and
//! the router that consumers subscribe through.

pub mod realtime_client;
pub use realtime_client::RealtimeClient;
