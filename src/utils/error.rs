//! Error types used within `realtime_mux`.
//!
//! Failures on the realtime path never cross the public boundary as panics:
//! decode and transport errors are logged where they happen and surface only
//! as connection status changes or a `false` from `send`. These variants are
//! what the internal layers pass around before that happens.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A frame or payload was not valid JSON for the expected shape.
    #[error("failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),

    /// A frame decoded but carried an empty `type`.
    #[error("envelope has an empty topic")]
    EmptyTopic,

    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
