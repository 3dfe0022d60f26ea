use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Loop settings shared by every spammer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpamConfig {
    /// Pause after each successful increment, in milliseconds
    pub increment_delay_ms: u64,
    /// Resynchronisations allowed in a row before the loop gives up
    pub max_consecutive_restarts: u32,
    /// Base delay for the exponential backoff between epoch-race restarts
    pub restart_backoff_ms: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            increment_delay_ms: 1000,
            max_consecutive_restarts: 10,
            restart_backoff_ms: 500,
        }
    }
}

impl SpamConfig {
    pub fn increment_delay(&self) -> Duration {
        Duration::from_millis(self.increment_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_consecutive_restarts == 0 {
            return Err(ConfigError::invalid(
                "max_consecutive_restarts",
                "must be at least 1",
            ));
        }
        if self.restart_backoff_ms > 60_000 {
            return Err(ConfigError::invalid(
                "restart_backoff_ms",
                format!("{} exceeds the 60000ms ceiling", self.restart_backoff_ms),
            ));
        }
        Ok(())
    }
}
