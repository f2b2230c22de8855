//! Batch record model for lockstep.
//!
//! A batch groups the tasks of one submitted operation and tracks aggregate
//! progress. Batches are stored one JSON document per batch under
//! `{store}/batches/`.
//!
//! # Status
//!
//! ```text
//! pending ─▶ running ─▶ canceling ─▶ canceled
//!    │          │           │
//!    │          ├───────────┴─▶ completed | failed
//!    └──────────────────────▶ canceling
//! ```
//!
//! Transitions only move forward by rank; terminal statuses never change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

mod io;
#[cfg(test)]
mod tests;

pub use io::BatchStore;

/// Batch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created; tasks still being written. Never claimed from.
    Pending,
    /// Tasks are claimable.
    Running,
    /// Cancel requested; in-flight tasks may still finish.
    Canceling,
    Completed,
    Failed,
    Canceled,
}

impl BatchStatus {
    /// Ordering rank; transitions must strictly increase it.
    pub fn rank(self) -> u8 {
        match self {
            BatchStatus::Pending => 0,
            BatchStatus::Running => 1,
            BatchStatus::Canceling => 2,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Canceled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 3
    }

    /// Whether a batch in `self` may move to `next`.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Canceling => "canceling",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BatchStatus::Pending),
            "running" => Ok(BatchStatus::Running),
            "canceling" => Ok(BatchStatus::Canceling),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            "canceled" => Ok(BatchStatus::Canceled),
            other => Err(format!("unknown batch status '{}'", other)),
        }
    }
}

/// A stored batch record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch identifier (time-ordered uuid).
    pub id: String,

    /// Operation kind; also the default task type of its tasks.
    pub batch_type: String,

    pub status: BatchStatus,

    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,

    /// Set when the batch reaches a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_on: Option<DateTime<Utc>>,

    pub total_task_count: u64,
    #[serde(default)]
    pub processed_task_count: u64,
    #[serde(default)]
    pub failed_task_count: u64,
}

impl Batch {
    /// Create a `pending` batch expecting `total_task_count` tasks.
    pub fn new(batch_type: &str, total_task_count: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            batch_type: batch_type.to_string(),
            status: BatchStatus::Pending,
            created_on: now,
            updated_on: now,
            completed_on: None,
            total_task_count,
            processed_task_count: 0,
            failed_task_count: 0,
        }
    }

    /// Tasks that reached a terminal state.
    pub fn finished_task_count(&self) -> u64 {
        self.processed_task_count + self.failed_task_count
    }

    /// Whether every task has finished.
    pub fn all_tasks_finished(&self) -> bool {
        self.finished_task_count() >= self.total_task_count
    }

    /// Move to `next` if allowed. Returns whether the status changed.
    pub fn advance_to(&mut self, next: BatchStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_on = now;
        if next.is_terminal() {
            self.completed_on = Some(now);
        }
        true
    }

    /// Raise the counters to at least the given values. Never decreases them.
    ///
    /// Returns whether anything changed.
    pub fn raise_counts(&mut self, processed: u64, failed: u64, now: DateTime<Utc>) -> bool {
        let processed = processed.max(self.processed_task_count);
        let failed = failed.max(self.failed_task_count);
        if processed == self.processed_task_count && failed == self.failed_task_count {
            return false;
        }
        self.processed_task_count = processed;
        self.failed_task_count = failed;
        self.updated_on = now;
        true
    }

    /// Terminal status implied by the counters once all tasks finished.
    pub fn finished_status(&self) -> BatchStatus {
        if self.failed_task_count == 0 {
            BatchStatus::Completed
        } else {
            BatchStatus::Failed
        }
    }
}
