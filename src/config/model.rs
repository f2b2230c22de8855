//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a lockstep store.
///
/// This struct represents the contents of `{store}/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Seconds a task lock stays live without renewal.
    ///
    /// This is the implicit task timeout: a worker that stops renewing for
    /// this long loses the task to the next claimer.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Seconds between lock renewals while a handler runs (must be < ttl).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    // =========================================================================
    // Worker settings
    // =========================================================================
    /// Milliseconds to sleep after a claim attempt finds nothing to do.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts before a failing task is marked terminally failed.
    ///
    /// Captured on each task at submission time.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    // =========================================================================
    // Maintenance settings
    // =========================================================================
    /// Seconds a batch may stay `pending` before maintenance reconciles it.
    #[serde(default = "default_pending_grace_secs")]
    pub pending_grace_secs: u64,

    /// Seconds between maintenance passes of a long-running worker.
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_ttl_secs: default_lock_ttl_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            pending_grace_secs: default_pending_grace_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
        }
    }
}

impl Config {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pending_grace(&self) -> Duration {
        Duration::from_secs(self.pending_grace_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}
