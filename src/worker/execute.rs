//! Executing and reporting a started attempt.

use super::claim::Started;
use super::{IterationOutcome, Worker};
use crate::error::{LockstepError, Result};
use crate::events::{Event, EventAction, record_event};
use crate::handlers::TaskContext;
use crate::locks::{Heartbeat, HeartbeatOutcome, LockGuard};
use crate::task::{ReportOutcome, Task};
use serde_json::{Value, json};
use std::time::Instant;

impl Worker {
    /// Run the handler under a heartbeat, then report.
    ///
    /// Order: task write, lock release, batch refresh. A lost lock skips all
    /// three; the record is left to expire.
    pub(super) fn execute(&self, started: Started) -> Result<IterationOutcome> {
        let Started { task, guard } = started;
        let attempt = task.attempts;

        let heartbeat = Heartbeat::start(
            self.locks.clone(),
            guard.abandon(),
            self.options.lock_ttl,
            self.options.heartbeat_interval,
        );
        let task_ctx = TaskContext::new(&task, heartbeat.lost_flag());

        let start = Instant::now();
        let result = self
            .registry
            .dispatch(&task.task_type, &task_ctx, &task.task_params);
        let duration_ms = start.elapsed().as_millis() as u64;

        let handle = match heartbeat.stop() {
            HeartbeatOutcome::Held(handle) => handle,
            HeartbeatOutcome::Lost => {
                self.report_lost(&task, attempt, duration_ms);
                return Ok(IterationOutcome::Lost(task.id));
            }
        };
        let guard = LockGuard::new(self.locks.clone(), handle);

        let outcome = self.report(&task, attempt, result, duration_ms)?;
        guard.release()?;

        if let Err(e) = self.coordinator.refresh_batch(&task.batch_id) {
            tracing::warn!(batch_id = %task.batch_id, error = %e, "batch refresh failed");
        }
        Ok(outcome)
    }

    fn report(
        &self,
        task: &Task,
        attempt: u32,
        result: Result<Value>,
        duration_ms: u64,
    ) -> Result<IterationOutcome> {
        let (written, error) = match result {
            Ok(value) => (
                self.tasks
                    .mark_processed(&task.batch_id, &task.id, attempt, value)?,
                None,
            ),
            Err(e) => {
                let permanent = !e.is_retryable();
                let message = failure_message(&e);
                (
                    self.tasks.record_failure(
                        &task.batch_id,
                        &task.id,
                        attempt,
                        &message,
                        permanent,
                    )?,
                    Some(message),
                )
            }
        };

        let (action, outcome) = match written {
            ReportOutcome::Completed => (EventAction::TaskSuccess, IterationOutcome::Completed(task.id.clone())),
            ReportOutcome::Retry => (EventAction::TaskRetry, IterationOutcome::Retrying(task.id.clone())),
            ReportOutcome::Failed => (EventAction::TaskFail, IterationOutcome::Failed(task.id.clone())),
            ReportOutcome::Stale => {
                // The lock held, so only a manual clear or a clock jump gets here.
                self.report_lost(task, attempt, duration_ms);
                return Ok(IterationOutcome::Lost(task.id.clone()));
            }
        };

        match &error {
            None => tracing::info!(task_id = %task.id, attempt, duration_ms, "task processed"),
            Some(error) if action == EventAction::TaskRetry => {
                tracing::warn!(task_id = %task.id, attempt, error = %error, "task attempt failed, will retry")
            }
            Some(error) => {
                tracing::error!(task_id = %task.id, attempt, error = %error, "task failed")
            }
        }
        record_event(
            &self.ctx,
            &Event::new(action)
                .with_actor(self.owner())
                .with_batch(&task.batch_id)
                .with_task(&task.id)
                .with_details(json!({
                    "attempt": attempt,
                    "duration_ms": duration_ms,
                    "error": error,
                })),
        );
        Ok(outcome)
    }

    fn report_lost(&self, task: &Task, attempt: u32, duration_ms: u64) {
        tracing::warn!(task_id = %task.id, attempt, "task lock lost; outcome discarded");
        record_event(
            &self.ctx,
            &Event::new(EventAction::TaskLost)
                .with_actor(self.owner())
                .with_batch(&task.batch_id)
                .with_task(&task.id)
                .with_details(json!({
                    "attempt": attempt,
                    "duration_ms": duration_ms,
                })),
        );
    }
}

/// The text stored in `last_error`.
fn failure_message(err: &LockstepError) -> String {
    match err {
        LockstepError::ExecutionError(message) => message.clone(),
        other => other.to_string(),
    }
}
