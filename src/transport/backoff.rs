//! Reconnect backoff
//!
//! Delay for attempt `n` (zero based) is `base * 2^n`, capped at `max`.
//! There is no attempt limit; only an explicit disconnect stops retrying.

use std::time::Duration;

use crate::config::ConnectionSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
    pub const DEFAULT_MAX: Duration = Duration::from_secs(30);

    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_MAX)
    }
}

impl From<&ConnectionSettings> for Backoff {
    fn from(settings: &ConnectionSettings) -> Self {
        Self::new(
            Duration::from_millis(settings.base_delay_ms),
            Duration::from_millis(settings.max_delay_ms),
        )
    }
}
