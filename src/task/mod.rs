//! Task record model for lockstep.
//!
//! A task is one independently retryable unit of work inside a batch. Tasks
//! are stored one JSON document per task under `{store}/tasks/{batch_id}/`,
//! so the per-batch directory doubles as the `batch_id` lookup index.
//! Marker-file indexes answer "unfinished tasks of a batch" for claiming and
//! "tasks of a type, processed or not" for inspection.
//!
//! # Lifecycle
//!
//! ```text
//! claimable ──attempt──▶ (running under a task lock)
//!     ▲                        │
//!     └──── retry ◀────────────┤
//!                              ├──▶ processed (terminal)
//!                              └──▶ failed    (terminal)
//! ```
//!
//! `processed` and `failed` each flip false→true at most once, never both.
//! `attempts` only increases, and every report is fenced on the attempt
//! number that produced it (see [`mutations`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

mod index;
mod io;
mod mutations;
#[cfg(test)]
mod tests;

pub use io::{OpenTasks, TaskStore};
pub use mutations::ReportOutcome;

/// A stored task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    // =========================================================================
    // Identity
    // =========================================================================
    /// Task identifier (time-ordered uuid).
    pub id: String,

    /// Owning batch.
    pub batch_id: String,

    /// 0-based creation order within the batch; claim tie-break.
    pub seq: u32,

    // =========================================================================
    // Work description
    // =========================================================================
    /// Handler selector.
    pub task_type: String,

    /// Opaque handler input.
    #[serde(default)]
    pub task_params: Value,

    // =========================================================================
    // Progress
    // =========================================================================
    #[serde(default)]
    pub processed: bool,

    /// Terminal failure flag.
    #[serde(default)]
    pub failed: bool,

    /// Number of attempts started so far.
    #[serde(default)]
    pub attempts: u32,

    /// Attempt ceiling, captured from configuration at submission.
    pub max_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Handler output of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    // =========================================================================
    // Timestamps
    // =========================================================================
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_on: Option<DateTime<Utc>>,
}

/// Input for one task of a new batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: String,
    #[serde(default)]
    pub task_params: Value,
}

impl TaskSpec {
    pub fn new(task_type: impl Into<String>, task_params: Value) -> Self {
        Self {
            task_type: task_type.into(),
            task_params,
        }
    }
}

impl Task {
    /// Create a fresh, unattempted task.
    pub fn new(batch_id: &str, seq: u32, spec: TaskSpec, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            batch_id: batch_id.to_string(),
            seq,
            task_type: spec.task_type,
            task_params: spec.task_params,
            processed: false,
            failed: false,
            attempts: 0,
            max_attempts,
            last_error: None,
            result: None,
            created_on: now,
            updated_on: now,
            completed_on: None,
        }
    }

    /// Processed or terminally failed.
    pub fn is_finished(&self) -> bool {
        self.processed || self.failed
    }

    /// Unfinished with attempts left. Does not consider locks.
    pub fn is_claimable(&self) -> bool {
        !self.is_finished() && self.attempts < self.max_attempts
    }

    /// Unfinished but out of attempts (a crash hit the final attempt).
    pub fn is_exhausted(&self) -> bool {
        !self.is_finished() && self.attempts >= self.max_attempts
    }

    /// Short status label for display.
    pub fn status_label(&self) -> &'static str {
        if self.processed {
            "processed"
        } else if self.failed {
            "failed"
        } else if self.is_exhausted() {
            "exhausted"
        } else if self.attempts > 0 {
            "retrying"
        } else {
            "queued"
        }
    }
}
