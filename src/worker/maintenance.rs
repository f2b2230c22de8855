//! Store maintenance and health inspection.

use super::Worker;
use crate::batch::{Batch, BatchStatus};
use crate::coordinator::ReconcileReport;
use crate::error::Result;
use crate::events::{Event, EventAction, record_event};
use crate::locks::{LockRecord, MAINTENANCE_KEY, MAINTENANCE_LOCK, TASK_LOCK};
use crate::task::Task;
use serde_json::json;

/// What one maintenance pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub purged_locks: usize,
    /// Tasks failed because their final attempt never reported.
    pub exhausted: Vec<String>,
    pub reconciled: ReconcileReport,
    /// Batches that reached a terminal status during the refresh sweep.
    pub finished: Vec<String>,
}

impl MaintenanceReport {
    pub fn is_empty(&self) -> bool {
        self.purged_locks == 0
            && self.exhausted.is_empty()
            && self.reconciled == ReconcileReport::default()
            && self.finished.is_empty()
    }
}

/// Problems found by [`Worker::inspect`]. Nothing is changed.
#[derive(Debug, Clone, Default)]
pub struct StoreHealth {
    pub expired_locks: Vec<LockRecord>,
    pub stale_pending: Vec<Batch>,
    pub exhausted_tasks: Vec<Task>,
    pub orphaned_task_batches: Vec<String>,
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        self.expired_locks.is_empty()
            && self.stale_pending.is_empty()
            && self.exhausted_tasks.is_empty()
            && self.orphaned_task_batches.is_empty()
    }
}

fn is_active(batch: &Batch) -> bool {
    matches!(batch.status, BatchStatus::Running | BatchStatus::Canceling)
}

impl Worker {
    /// Run one maintenance pass.
    ///
    /// Returns `None` when another worker holds the maintenance lock.
    pub fn maintain(&self) -> Result<Option<MaintenanceReport>> {
        let Some(guard) =
            self.locks
                .try_guard(MAINTENANCE_LOCK, MAINTENANCE_KEY, self.options.lock_ttl)?
        else {
            tracing::debug!("maintenance already running elsewhere");
            return Ok(None);
        };

        let mut report = MaintenanceReport {
            purged_locks: self.locks.purge_expired()?,
            ..MaintenanceReport::default()
        };
        report.exhausted = self.fail_exhausted_tasks()?;
        report.reconciled = self
            .coordinator
            .reconcile_pending(self.options.pending_grace)?;

        for batch in self.batches.list()?.into_iter().filter(is_active) {
            let refreshed = self.coordinator.refresh_batch(&batch.id)?;
            if refreshed.status.is_terminal() {
                report.finished.push(refreshed.id);
            }
        }

        guard.release()?;

        if !report.is_empty() {
            tracing::info!(
                purged_locks = report.purged_locks,
                exhausted = report.exhausted.len(),
                promoted = report.reconciled.promoted.len(),
                discarded = report.reconciled.discarded.len(),
                finished = report.finished.len(),
                "maintenance pass"
            );
            record_event(
                &self.ctx,
                &Event::new(EventAction::Maintenance)
                    .with_actor(self.owner())
                    .with_details(json!({
                        "purged_locks": report.purged_locks,
                        "exhausted": report.exhausted,
                        "promoted": report.reconciled.promoted,
                        "discarded": report.reconciled.discarded,
                        "finished": report.finished,
                    })),
            );
        }
        Ok(Some(report))
    }

    /// Fail tasks whose final attempt crashed before reporting.
    ///
    /// Each task is re-checked under its own lock, so a live attempt is never
    /// touched.
    fn fail_exhausted_tasks(&self) -> Result<Vec<String>> {
        let mut failed = Vec::new();
        for batch in self.batches.list()?.into_iter().filter(is_active) {
            for task in self.tasks.open_tasks(&batch.id)? {
                let task = task?;
                if !task.is_exhausted() {
                    continue;
                }
                let Some(guard) = self
                    .locks
                    .try_guard(TASK_LOCK, &task.id, self.options.lock_ttl)?
                else {
                    continue;
                };
                if self.tasks.mark_exhausted(&task.batch_id, &task.id)? {
                    tracing::warn!(task_id = %task.id, attempts = task.attempts, "exhausted task marked failed");
                    record_event(
                        &self.ctx,
                        &Event::new(EventAction::TaskFail)
                            .with_actor(self.owner())
                            .with_batch(&task.batch_id)
                            .with_task(&task.id)
                            .with_details(json!({
                                "attempt": task.attempts,
                                "reason": "exhausted",
                            })),
                    );
                    failed.push(task.id.clone());
                }
                guard.release()?;
            }
        }
        Ok(failed)
    }

    /// Report store problems that maintenance would address.
    pub fn inspect(&self) -> Result<StoreHealth> {
        let expired_locks = self
            .locks
            .list(true)?
            .into_iter()
            .filter(|record| !record.is_live())
            .collect();

        let mut exhausted_tasks = Vec::new();
        for batch in self.batches.list()?.into_iter().filter(is_active) {
            for task in self.tasks.open_tasks(&batch.id)? {
                let task = task?;
                if task.is_exhausted() && !self.locks.is_locked(TASK_LOCK, &task.id)? {
                    exhausted_tasks.push(task);
                }
            }
        }

        Ok(StoreHealth {
            expired_locks,
            stale_pending: self.coordinator.stale_pending(self.options.pending_grace)?,
            exhausted_tasks,
            orphaned_task_batches: self.coordinator.orphaned_task_batches()?,
        })
    }
}
