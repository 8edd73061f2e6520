//! Pool configuration types

use std::collections::BTreeSet;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Signals that retire a client unless configured otherwise.
pub const DEFAULT_WATCHED_SIGNALS: [&str; 4] = ["close", "end", "error", "timeout"];

/// Configuration for a resource pool
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Name used in log lines and errors
    pub name: String,
    /// Maximum number of live resources, in-flight creations included
    pub max_resources: usize,
    /// Idle time after which a resource is health checked by the reaper
    pub max_idle_time: Duration,
    /// Delay between the end of one reaper pass and the start of the next
    pub check_interval: Duration,
    /// Client signals that retire the client as soon as they fire
    pub watched_signals: BTreeSet<String>,
    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pooling".to_string(),
            max_resources: 10,
            max_idle_time: Duration::from_secs(3600),
            check_interval: Duration::from_secs(30),
            watched_signals: DEFAULT_WATCHED_SIGNALS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            event_buffer: 1024,
        }
    }
}

impl PoolConfig {
    /// Default config with the given capacity.
    #[must_use]
    pub fn with_max_resources(max_resources: usize) -> Self {
        Self {
            max_resources,
            ..Default::default()
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_resources == 0 {
            return Err(Error::invalid_config("max_resources must be greater than 0"));
        }
        if self.event_buffer == 0 {
            return Err(Error::invalid_config("event_buffer must be greater than 0"));
        }
        if let Some(bad) = self.watched_signals.iter().find(|s| s.trim().is_empty()) {
            return Err(Error::invalid_config(format!(
                "watched signal names must not be blank (got {bad:?})"
            )));
        }
        Ok(())
    }
}
