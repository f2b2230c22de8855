//! Lock record structure and owner identity.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A lock record as stored in `locks/{lock_type}/{key}.json`.
///
/// A record is live iff `expires_on > now`. Expired records are semantically
/// absent even before the reaper deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Lock namespace (e.g. `task`, `batch`, `maintenance`, `room`).
    pub lock_type: String,

    /// Resource key within the namespace.
    pub key: String,

    /// Random identity of this acquisition. Renew and release compare it.
    pub token: String,

    /// Holder identity (`user@host:pid:suffix`), diagnostic only.
    pub owner: String,

    /// When this acquisition happened.
    pub acquired_at: DateTime<Utc>,

    /// When the lock stops being live unless renewed.
    pub expires_on: DateTime<Utc>,
}

impl LockRecord {
    /// Whether the lock is live at `now`.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }

    /// Whether the lock is live right now.
    pub fn is_live(&self) -> bool {
        self.is_live_at(Utc::now())
    }

    /// Time since the lock was acquired.
    pub fn age(&self) -> Duration {
        Utc::now().signed_duration_since(self.acquired_at)
    }

    /// Time left before expiry (negative once expired).
    pub fn remaining(&self) -> Duration {
        self.expires_on.signed_duration_since(Utc::now())
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        format_duration(self.age())
    }
}

impl std::fmt::Display for LockRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let remaining = self.remaining();
        write!(
            f,
            "{}/{} (owner: {}, age: {}, {})",
            self.lock_type,
            self.key,
            self.owner,
            self.age_string(),
            if remaining > Duration::zero() {
                format!("expires in {}", format_duration(remaining))
            } else {
                "EXPIRED".to_string()
            }
        )
    }
}

fn format_duration(d: Duration) -> String {
    let seconds = d.num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{}d {}h", days, hours % 24)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

/// Get the owner string identifying this worker.
///
/// `user@host:pid:suffix`; the random suffix tells apart several managers
/// living in one process.
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let suffix = uuid::Uuid::now_v7().simple().to_string();
    let suffix = &suffix[suffix.len() - 8..];

    format!("{}@{}:{}:{}", user, host, std::process::id(), suffix)
}
