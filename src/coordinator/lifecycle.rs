//! Batch progress recomputation, reconciliation, and cleanup.

use super::BatchCoordinator;
use crate::batch::{Batch, BatchStatus};
use crate::error::{LockstepError, Result};
use crate::events::{Event, EventAction, record_event};
use crate::locks::{BATCH_LOCK, TASK_LOCK};
use chrono::Utc;
use serde_json::json;
use std::time::Duration;

/// What [`BatchCoordinator::reconcile_pending`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Batches whose tasks were all present; now `running`.
    pub promoted: Vec<String>,
    /// Partially created batches that were deleted.
    pub discarded: Vec<String>,
}

impl BatchCoordinator {
    /// Recompute a batch from its task records.
    ///
    /// Counters become `max(stored, counted)`. A running or canceling batch
    /// whose tasks all finished becomes `completed` (no failures) or
    /// `failed`; a canceling batch with no task under a live lock becomes
    /// `canceled`. Idempotent and safe to run from many workers at once.
    pub fn refresh_batch(&self, batch_id: &str) -> Result<Batch> {
        let batch = self.batches.require(batch_id)?;
        if !matches!(batch.status, BatchStatus::Running | BatchStatus::Canceling) {
            return Ok(batch);
        }

        let tasks = self.tasks.list(batch_id)?;
        let processed = tasks.iter().filter(|t| t.processed).count() as u64;
        let failed = tasks.iter().filter(|t| t.failed).count() as u64;

        let mut in_flight = false;
        if batch.status == BatchStatus::Canceling {
            for task in tasks.iter().filter(|t| !t.is_finished()) {
                if self.locks.is_locked(TASK_LOCK, &task.id)? {
                    in_flight = true;
                    break;
                }
            }
        }

        let mut finished = false;
        let (batch, _) = self
            .batches
            .modify(batch_id, |b| {
                let now = Utc::now();
                let mut changed = b.raise_counts(processed, failed, now);
                let next = if b.all_tasks_finished() {
                    Some(b.finished_status())
                } else if b.status == BatchStatus::Canceling && !in_flight {
                    Some(BatchStatus::Canceled)
                } else {
                    None
                };
                if let Some(next) = next
                    && b.advance_to(next, now)
                {
                    finished = true;
                    changed = true;
                }
                changed
            })?
            .ok_or_else(|| LockstepError::BatchNotFound(batch_id.to_string()))?;

        if finished {
            self.announce_finish(&batch);
        }
        Ok(batch)
    }

    fn announce_finish(&self, batch: &Batch) {
        tracing::info!(
            batch_id = %batch.id,
            status = %batch.status,
            processed = batch.processed_task_count,
            failed = batch.failed_task_count,
            "batch finished"
        );
        record_event(
            &self.ctx,
            &Event::new(EventAction::BatchFinish)
                .with_batch(&batch.id)
                .with_details(json!({
                    "status": batch.status,
                    "processed_task_count": batch.processed_task_count,
                    "failed_task_count": batch.failed_task_count,
                    "total_task_count": batch.total_task_count,
                })),
        );
    }

    /// Pending batches older than `grace`.
    pub fn stale_pending(&self, grace: Duration) -> Result<Vec<Batch>> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|e| LockstepError::UserError(format!("invalid grace period: {}", e)))?;
        let cutoff = Utc::now() - grace;
        Ok(self
            .batches
            .list()?
            .into_iter()
            .filter(|b| b.status == BatchStatus::Pending && b.created_on <= cutoff)
            .collect())
    }

    /// Resolve batches left `pending` by an interrupted submission.
    ///
    /// A stale pending batch whose task records are all present is promoted
    /// to `running`; otherwise the batch and its tasks are deleted.
    pub fn reconcile_pending(&self, grace: Duration) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for batch in self.stale_pending(grace)? {
            let present = self.tasks.count(&batch.id)? as u64;

            if present >= batch.total_task_count {
                let promoted = self.batches.modify(&batch.id, |b| {
                    b.status == BatchStatus::Pending && b.advance_to(BatchStatus::Running, Utc::now())
                })?;
                if let Some((_, true)) = promoted {
                    tracing::info!(batch_id = %batch.id, "promoted stale pending batch");
                    report.promoted.push(batch.id.clone());
                    self.refresh_batch(&batch.id)?;
                }
                continue;
            }

            let removed = self
                .batches
                .delete_if(&batch.id, |b| b.status == BatchStatus::Pending)?;
            if !removed {
                continue;
            }
            self.tasks.delete_all(&batch.id)?;
            self.batches.discard_guard(&batch.id)?;

            let error = LockstepError::InconsistentBatchCreation(format!(
                "only {} of {} tasks were written",
                present, batch.total_task_count
            ));
            tracing::warn!(batch_id = %batch.id, error = %error, "discarded partial batch");
            record_event(
                &self.ctx,
                &Event::new(EventAction::BatchDiscard)
                    .with_batch(&batch.id)
                    .with_details(json!({
                        "error": error.to_string(),
                        "present_task_count": present,
                        "total_task_count": batch.total_task_count,
                    })),
            );
            report.discarded.push(batch.id);
        }

        Ok(report)
    }

    /// Delete a terminal batch together with its tasks and their locks.
    ///
    /// Runs under the batch's `("batch", id)` lock so concurrent cleaners
    /// do not interleave.
    pub fn delete_batch(&self, batch_id: &str) -> Result<()> {
        let batch = self.batches.require(batch_id)?;
        if !batch.status.is_terminal() {
            return Err(LockstepError::UserError(format!(
                "batch '{}' is {}; only completed, failed or canceled batches can be deleted",
                batch_id, batch.status
            )));
        }

        let Some(guard) = self.locks.try_guard(BATCH_LOCK, batch_id, self.lock_ttl)? else {
            return Err(LockstepError::LockError(format!(
                "batch '{}' is being deleted by another process",
                batch_id
            )));
        };

        let tasks = self.tasks.list(batch_id)?;
        for task in &tasks {
            self.locks.clear(TASK_LOCK, &task.id)?;
            self.locks.discard_key(TASK_LOCK, &task.id)?;
        }
        self.tasks.delete_all(batch_id)?;
        self.batches.delete(batch_id)?;
        self.batches.discard_guard(batch_id)?;
        guard.release()?;
        self.locks.discard_key(BATCH_LOCK, batch_id)?;

        tracing::info!(batch_id, tasks = tasks.len(), "batch deleted");
        record_event(
            &self.ctx,
            &Event::new(EventAction::BatchClean)
                .with_batch(batch_id)
                .with_details(json!({
                    "status": batch.status,
                    "task_count": tasks.len(),
                })),
        );
        Ok(())
    }

    /// Task directories whose batch record no longer exists.
    pub fn orphaned_task_batches(&self) -> Result<Vec<String>> {
        let mut orphans = Vec::new();
        for batch_id in self.tasks.batch_ids()? {
            if self.batches.get(&batch_id)?.is_none() {
                orphans.push(batch_id);
            }
        }
        Ok(orphans)
    }

    /// Remove task directories left behind by an interrupted cleanup.
    pub fn remove_orphaned_tasks(&self) -> Result<usize> {
        let orphans = self.orphaned_task_batches()?;
        for batch_id in &orphans {
            self.tasks.delete_all(batch_id)?;
        }
        Ok(orphans.len())
    }
}
