//! Lock handle and operation outcomes.

use super::metadata::LockRecord;
use chrono::{DateTime, Utc};

/// Lock type guarding the execution of one task (key: task id).
pub const TASK_LOCK: &str = "task";

/// Lock type for batch-wide operations (key: batch id).
pub const BATCH_LOCK: &str = "batch";

/// Lock type serializing store maintenance passes (key: [`MAINTENANCE_KEY`]).
pub const MAINTENANCE_LOCK: &str = "maintenance";

/// The single key used with [`MAINTENANCE_LOCK`].
pub const MAINTENANCE_KEY: &str = "store";

/// Proof of one successful acquisition, held by the acquirer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub lock_type: String,
    pub key: String,
    pub token: String,
    pub owner: String,
    /// Expiry as of the last successful acquire or renew.
    pub expires_on: DateTime<Utc>,
}

impl LockHandle {
    pub(super) fn from_record(record: &LockRecord) -> Self {
        Self {
            lock_type: record.lock_type.clone(),
            key: record.key.clone(),
            token: record.token.clone(),
            owner: record.owner.clone(),
            expires_on: record.expires_on,
        }
    }

    /// Whether the last known expiry has passed.
    ///
    /// Once true, exclusivity is no longer guaranteed even if nobody has
    /// reclaimed the lock yet.
    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

/// Result of [`super::LockManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The lock is now held by the caller.
    Acquired(LockHandle),
    /// Another holder has a live lock.
    Conflict(LockRecord),
}

impl Acquire {
    /// The handle, if acquisition succeeded.
    pub fn acquired(self) -> Option<LockHandle> {
        match self {
            Acquire::Acquired(handle) => Some(handle),
            Acquire::Conflict(_) => None,
        }
    }
}

/// Result of [`super::LockManager::renew`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    /// The expiry was extended to the contained time.
    Renewed(DateTime<Utc>),
    /// The lock is gone, expired, or held by someone else.
    Lost,
}

/// Result of [`super::LockManager::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Released,
    /// Nothing was deleted: the record is missing or carries another token.
    NotHeld,
}
