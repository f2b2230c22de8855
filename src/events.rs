//! Event logging subsystem for lockstep.
//!
//! This module implements the append-only audit trail of a store. Events are
//! stored in NDJSON format (one JSON object per line) in
//! `{store}/events/events.ndjson`.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action performed (batch_submit, task_claim, lock_clear, ...)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `batch`: Optional batch ID
//! - `task`: Optional task ID for task-specific events
//! - `details`: Freeform object with action-specific details
//!
//! Many workers append concurrently. Each event is written with a single
//! `O_APPEND` write, so lines from different processes never interleave.
//!
//! ```no_run
//! use lockstep::events::{Event, EventAction, append_event};
//! use lockstep::context::StoreContext;
//! use serde_json::json;
//!
//! let ctx = StoreContext::resolve(None)?;
//! let event = Event::new(EventAction::BatchSubmit)
//!     .with_batch("0190a1b2-c3d4-7e5f-8a9b-0c1d2e3f4a5b")
//!     .with_details(json!({"batch_type": "noop", "total_task_count": 3}));
//! append_event(&ctx, &event)?;
//! # Ok::<(), lockstep::error::LockstepError>(())
//! ```

use crate::context::StoreContext;
use crate::error::{LockstepError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Store layout created
    Init,
    /// Batch created and its tasks written
    BatchSubmit,
    /// Batch moved to canceling
    BatchCancel,
    /// Batch reached a terminal status
    BatchFinish,
    /// Partially created batch removed by reconciliation
    BatchDiscard,
    /// Terminal batch deleted
    BatchClean,
    /// Worker locked a task and started an attempt
    TaskClaim,
    /// Task handler succeeded
    TaskSuccess,
    /// Task attempt failed; the task will be retried
    TaskRetry,
    /// Task failed terminally
    TaskFail,
    /// Worker lost the task lock during execution
    TaskLost,
    /// Lock cleared manually
    LockClear,
    /// Maintenance pass completed
    Maintenance,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Init => write!(f, "init"),
            EventAction::BatchSubmit => write!(f, "batch_submit"),
            EventAction::BatchCancel => write!(f, "batch_cancel"),
            EventAction::BatchFinish => write!(f, "batch_finish"),
            EventAction::BatchDiscard => write!(f, "batch_discard"),
            EventAction::BatchClean => write!(f, "batch_clean"),
            EventAction::TaskClaim => write!(f, "task_claim"),
            EventAction::TaskSuccess => write!(f, "task_success"),
            EventAction::TaskRetry => write!(f, "task_retry"),
            EventAction::TaskFail => write!(f, "task_fail"),
            EventAction::TaskLost => write!(f, "task_lost"),
            EventAction::LockClear => write!(f, "lock_clear"),
            EventAction::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Optional batch ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,

    /// Optional task ID for task-specific events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            batch: None,
            task: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    /// Set the batch ID for this event.
    pub fn with_batch(mut self, batch_id: impl Into<String>) -> Self {
        self.batch = Some(batch_id.into());
        self
    }

    /// Set the task ID for this event.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task = Some(task_id.into());
        self
    }

    /// Override the actor (workers log their full owner string).
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    /// Set the details object for this event.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            LockstepError::StoreError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Get the actor string for event metadata.
pub(crate) fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Get the path to the events file.
pub fn events_file_path(ctx: &StoreContext) -> PathBuf {
    ctx.events_dir.join("events.ndjson")
}

/// Append an event to the events log.
///
/// The file is created if it doesn't exist. Each append results in one line
/// with a trailing newline, synced to disk before returning.
pub fn append_event(ctx: &StoreContext, event: &Event) -> Result<()> {
    let events_file = events_file_path(ctx);

    let mut line = event.to_ndjson_line()?;
    line.push('\n');

    fs::create_dir_all(&ctx.events_dir).map_err(|e| {
        LockstepError::StoreError(format!(
            "failed to create events directory '{}': {}",
            ctx.events_dir.display(),
            e
        ))
    })?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&events_file)
        .map_err(|e| {
            LockstepError::StoreError(format!(
                "failed to open events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

    file.write_all(line.as_bytes()).map_err(|e| {
        LockstepError::StoreError(format!(
            "failed to write event to '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    file.sync_all().map_err(|e| {
        LockstepError::StoreError(format!(
            "failed to sync events file '{}': {}",
            events_file.display(),
            e
        ))
    })?;

    Ok(())
}

/// Append an event, logging instead of failing.
///
/// Workers use this: the audit trail must never decide whether a task
/// outcome gets reported.
pub fn record_event(ctx: &StoreContext, event: &Event) {
    if let Err(e) = append_event(ctx, event) {
        tracing::warn!(action = %event.action, error = %e, "failed to append event");
    }
}

/// Read every event in the log, oldest first.
///
/// Lines that fail to parse (e.g. a torn final line after a crash) are skipped.
pub fn read_events(ctx: &StoreContext) -> Result<Vec<Event>> {
    let events_file = events_file_path(ctx);
    let content = match fs::read_to_string(&events_file) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(LockstepError::StoreError(format!(
                "failed to read events file '{}': {}",
                events_file.display(),
                e
            )));
        }
    };

    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, StoreContext) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = StoreContext::at(temp_dir.path()).unwrap();
        (temp_dir, ctx)
    }

    #[test]
    fn test_event_creation() {
        let event = Event::new(EventAction::Init);

        assert_eq!(event.action, EventAction::Init);
        assert!(!event.actor.is_empty());
        assert!(event.task.is_none());
        assert!(event.batch.is_none());
        let age = Utc::now().signed_duration_since(event.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(EventAction::TaskClaim)
            .with_batch("b1")
            .with_task("t1")
            .with_actor("alice@host:42:abcd")
            .with_details(json!({"attempt": 1}));

        assert_eq!(event.batch.as_deref(), Some("b1"));
        assert_eq!(event.task.as_deref(), Some("t1"));
        assert_eq!(event.actor, "alice@host:42:abcd");
        assert_eq!(event.details["attempt"], 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventAction::TaskRetry)
            .with_task("t1")
            .with_details(json!({"error": "boom"}));

        let json_line = event.to_ndjson_line().unwrap();
        assert!(!json_line.contains('\n'));
        assert!(json_line.contains("\"task_retry\""));

        let parsed: serde_json::Value = serde_json::from_str(&json_line).unwrap();
        assert!(parsed.get("batch").is_none());
        assert_eq!(parsed["task"], "t1");
    }

    #[test]
    fn test_action_display_matches_serialization() {
        for action in [
            EventAction::BatchDiscard,
            EventAction::LockClear,
            EventAction::Maintenance,
        ] {
            let serialized = serde_json::to_string(&action).unwrap();
            assert_eq!(serialized, format!("\"{}\"", action));
        }
    }

    #[test]
    fn test_append_event_creates_file() {
        let (_temp_dir, ctx) = create_test_store();
        let events_file = events_file_path(&ctx);
        assert!(!events_file.exists());

        let event = Event::new(EventAction::Init);
        append_event(&ctx, &event).unwrap();

        assert!(events_file.exists());
        let events = read_events(&ctx).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, EventAction::Init);
    }

    #[test]
    fn test_append_event_multiple_lines() {
        let (_temp_dir, ctx) = create_test_store();

        append_event(&ctx, &Event::new(EventAction::BatchSubmit).with_batch("b1")).unwrap();
        append_event(&ctx, &Event::new(EventAction::TaskClaim).with_task("t1")).unwrap();

        let content = fs::read_to_string(events_file_path(&ctx)).unwrap();
        assert_eq!(content.lines().count(), 2);

        let events = read_events(&ctx).unwrap();
        assert_eq!(events[0].action, EventAction::BatchSubmit);
        assert_eq!(events[1].action, EventAction::TaskClaim);
    }

    #[test]
    fn test_read_events_skips_torn_lines() {
        let (_temp_dir, ctx) = create_test_store();

        append_event(&ctx, &Event::new(EventAction::Init)).unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(events_file_path(&ctx))
            .unwrap();
        write!(file, "{{\"ts\":\"2026").unwrap();

        assert_eq!(read_events(&ctx).unwrap().len(), 1);
    }

    #[test]
    fn test_read_events_missing_file_is_empty() {
        let (_temp_dir, ctx) = create_test_store();
        assert!(read_events(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let (_temp_dir, ctx) = create_test_store();
        let ctx = Arc::new(ctx);

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let ctx = Arc::clone(&ctx);
                std::thread::spawn(move || {
                    for j in 0..20 {
                        let event = Event::new(EventAction::TaskSuccess)
                            .with_task(format!("t{}-{}", i, j));
                        append_event(&ctx, &event).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(events_file_path(&ctx)).unwrap();
        assert_eq!(content.lines().count(), 80);
        assert_eq!(read_events(&ctx).unwrap().len(), 80);
    }
}
