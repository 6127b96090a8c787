use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of the delay curve between reconnect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base × attempt`
    Linear,
    /// `base × 2^(attempt-1)`, capped at `max_delay`
    Exponential,
}

/// Reconnect configuration for a socket session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_interval: Duration,
    /// Retries allowed after consecutive unexpected closes
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Only applies to exponential backoff
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(3000),
            max_attempts: 5,
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Linear => self.base_interval.saturating_mul(attempt),
            Backoff::Exponential => {
                let exp = (attempt - 1).min(16);
                self.base_interval
                    .saturating_mul(1u32 << exp)
                    .min(self.max_delay)
            }
        }
    }
}
