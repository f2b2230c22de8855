//! Configuration defaults for lockstep.

/// Default lock time-to-live in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 30;

/// Default heartbeat (lock renewal) interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Default sleep between empty claim attempts, in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default attempt ceiling per task.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default age after which a `pending` batch is reconciled, in seconds.
pub const DEFAULT_PENDING_GRACE_SECS: u64 = 300;

/// Default interval between maintenance passes, in seconds.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60;

pub fn default_lock_ttl_secs() -> u64 {
    DEFAULT_LOCK_TTL_SECS
}

pub fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

pub fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

pub fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

pub fn default_pending_grace_secs() -> u64 {
    DEFAULT_PENDING_GRACE_SECS
}

pub fn default_maintenance_interval_secs() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_SECS
}
