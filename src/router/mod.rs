//! The `router` module owns the subscription registry and fans inbound
//! envelopes out to per-topic and catch-all handlers.

pub mod engine;
pub mod subscription;
pub mod topic;

pub use engine::{Handler, Router};
pub use subscription::{Subscription, SubscriptionId};
