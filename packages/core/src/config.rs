//! Protocol configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Locker entries are scheduled this far out. They are storage, not timers.
pub const DEFAULT_LOCKER_DELAY_SECS: u64 = 365 * 24 * 3600;

/// Configuration shared by every component of one context's service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuttleConfig {
    /// Fire delay of durable locker entries, in seconds.
    pub locker_delay_secs: u64,

    /// Hand off to a context only once per hub lifetime instead of on every
    /// unlock event.
    pub dedupe_unlock_events: bool,

    /// Bound of a simulated host's per-context delivery queue.
    pub delivery_capacity: usize,
}

impl ShuttleConfig {
    pub fn locker_delay(&self) -> Duration {
        Duration::from_secs(self.locker_delay_secs)
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for ShuttleConfig {
    fn default() -> Self {
        Self {
            locker_delay_secs: DEFAULT_LOCKER_DELAY_SECS,
            dedupe_unlock_events: false,
            delivery_capacity: 1024,
        }
    }
}
