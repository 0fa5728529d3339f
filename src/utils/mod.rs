//! The `utils` module provides shared building blocks used across the
//! `realtime_mux` crate: the error taxonomy and logging initialisation.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
