//! Locking subsystem for lockstep.
//!
//! This module implements lightweight expiring locks over one generic table
//! keyed by `(lock_type, key)`:
//! - Per-task locks (`task`/`{task_id}`) give a worker exclusive execution
//! - The maintenance lock (`maintenance`/`store`) serializes store upkeep
//! - Any other namespace (`batch`, `room`, ...) is accepted as-is
//!
//! # Lock Records
//!
//! Records live in `{store}/locks/{lock_type}/{key}.json` and carry a random
//! token, the owner string, and an expiry. A record is live iff
//! `expires_on > now`; an expired record is treated as absent and may be
//! overwritten by the next acquirer. Crash recovery is by expiry only.
//!
//! # Guards and Heartbeats
//!
//! [`LockGuard`] releases on drop. [`Heartbeat`] keeps a lock alive while
//! work runs and reports when it was lost.

mod guard;
mod heartbeat;
mod manager;
mod metadata;
mod types;


pub use guard::LockGuard;
pub use heartbeat::{Heartbeat, HeartbeatOutcome};
pub use manager::LockManager;
pub use metadata::LockRecord;
pub use types::{
    Acquire, BATCH_LOCK, LockHandle, MAINTENANCE_KEY, MAINTENANCE_LOCK, Release, Renewal,
    TASK_LOCK,
};
