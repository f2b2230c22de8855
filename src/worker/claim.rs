//! Claiming: pick a candidate, lock it, re-check it, start an attempt.

use super::Worker;
use crate::batch::BatchStatus;
use crate::error::Result;
use crate::events::{Event, EventAction, record_event};
use crate::locks::{Acquire, LockGuard, TASK_LOCK};
use crate::task::Task;
use serde_json::json;

/// A task whose attempt has started under a held lock.
pub(super) struct Started {
    pub task: Task,
    pub guard: LockGuard,
}

pub(super) enum Claim {
    Contended,
    Skipped(String),
    Started(Started),
}

impl Worker {
    /// First claimable task without a live lock, scanning running batches in
    /// creation order and their open tasks in `seq` order.
    ///
    /// Only unfinished tasks are read, and the walk stops at the first hit.
    pub(super) fn next_candidate(&self) -> Result<Option<Task>> {
        for batch in self.batches.list()? {
            if batch.status != BatchStatus::Running {
                continue;
            }
            for task in self.tasks.open_tasks(&batch.id)? {
                let task = task?;
                if task.is_claimable() && !self.locks.is_locked(TASK_LOCK, &task.id)? {
                    return Ok(Some(task));
                }
            }
        }
        Ok(None)
    }

    pub(super) fn claim_next(&self) -> Result<Option<Claim>> {
        let Some(candidate) = self.next_candidate()? else {
            return Ok(None);
        };

        let handle = match self
            .locks
            .acquire(TASK_LOCK, &candidate.id, self.options.lock_ttl)?
        {
            Acquire::Acquired(handle) => handle,
            Acquire::Conflict(holder) => {
                tracing::debug!(task_id = %candidate.id, holder = %holder.owner, "task lock contended");
                return Ok(Some(Claim::Contended));
            }
        };
        let guard = LockGuard::new(self.locks.clone(), handle);

        // Re-read under the lock: another worker may have finished the task or
        // the batch may have been canceled since the scan.
        let eligible = match self.tasks.get(&candidate.batch_id, &candidate.id)? {
            Some(task) if task.is_claimable() => self
                .batches
                .get(&task.batch_id)?
                .is_some_and(|b| b.status == BatchStatus::Running)
                .then_some(task),
            _ => None,
        };
        let Some(task) = eligible else {
            guard.release()?;
            return Ok(Some(Claim::Skipped(candidate.id)));
        };

        let Some(task) = self
            .tasks
            .begin_attempt(&task.batch_id, &task.id, task.attempts)?
        else {
            guard.release()?;
            return Ok(Some(Claim::Skipped(candidate.id)));
        };

        tracing::info!(
            task_id = %task.id,
            batch_id = %task.batch_id,
            task_type = %task.task_type,
            attempt = task.attempts,
            max_attempts = task.max_attempts,
            "task claimed"
        );
        record_event(
            &self.ctx,
            &Event::new(EventAction::TaskClaim)
                .with_actor(self.owner())
                .with_batch(&task.batch_id)
                .with_task(&task.id)
                .with_details(json!({
                    "task_type": task.task_type,
                    "attempt": task.attempts,
                    "max_attempts": task.max_attempts,
                })),
        );

        Ok(Some(Claim::Started(Started { task, guard })))
    }
}
