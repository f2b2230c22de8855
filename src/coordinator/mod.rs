//! Batch coordinator: the upward-facing API for submitting and tracking work.
//!
//! The coordinator creates batches and their tasks, answers status queries,
//! requests cancellation, and owns the idempotent recomputation that moves a
//! batch to a terminal status once its tasks are done. Any number of
//! coordinators and workers may run against the same store; every decision
//! re-reads the store and every write is a conditional single-record update.

mod lifecycle;

pub use lifecycle::ReconcileReport;

use crate::batch::{Batch, BatchStatus, BatchStore};
use crate::config::Config;
use crate::context::StoreContext;
use crate::error::{LockstepError, Result};
use crate::events::{Event, EventAction, record_event};
use crate::locks::LockManager;
use crate::task::{Task, TaskSpec, TaskStore};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Summary of a batch for callers that only need progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchStatusView {
    pub status: BatchStatus,
    pub total_task_count: u64,
    pub processed_task_count: u64,
    pub failed_task_count: u64,
}

impl From<&Batch> for BatchStatusView {
    fn from(batch: &Batch) -> Self {
        Self {
            status: batch.status,
            total_task_count: batch.total_task_count,
            processed_task_count: batch.processed_task_count,
            failed_task_count: batch.failed_task_count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchCoordinator {
    ctx: StoreContext,
    batches: BatchStore,
    tasks: TaskStore,
    locks: LockManager,
    max_attempts: u32,
    lock_ttl: Duration,
}

impl BatchCoordinator {
    /// Fails if `config` does not validate.
    pub fn new(ctx: &StoreContext, config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ctx: ctx.clone(),
            batches: BatchStore::new(ctx),
            tasks: TaskStore::new(ctx),
            locks: LockManager::new(ctx),
            max_attempts: config.max_attempts,
            lock_ttl: config.lock_ttl(),
        })
    }

    /// Coordinator configured from the store's `config.yaml`.
    pub fn open(ctx: &StoreContext) -> Result<Self> {
        let config = Config::load_or_default(ctx.config_path())?;
        Self::new(ctx, &config)
    }

    /// Create a batch with one `batch_type` task per params entry.
    pub fn create_batch(&self, batch_type: &str, params_list: Vec<Value>) -> Result<Batch> {
        let specs = params_list
            .into_iter()
            .map(|params| TaskSpec::new(batch_type, params))
            .collect();
        self.create_batch_with(batch_type, specs)
    }

    /// Create a batch whose tasks may use different task types.
    ///
    /// The batch is written `pending`, then its tasks, then promoted to
    /// `running`. If task creation fails the partial batch is discarded
    /// (best effort) and [`LockstepError::InconsistentBatchCreation`] is
    /// returned; whatever a crash leaves behind is reconciled by maintenance.
    pub fn create_batch_with(&self, batch_type: &str, specs: Vec<TaskSpec>) -> Result<Batch> {
        if batch_type.trim().is_empty() {
            return Err(LockstepError::UserError(
                "batch type must not be empty".to_string(),
            ));
        }
        if let Some(spec) = specs.iter().find(|s| s.task_type.trim().is_empty()) {
            return Err(LockstepError::UserError(format!(
                "task type must not be empty (params: {})",
                spec.task_params
            )));
        }

        let batch = Batch::new(batch_type, specs.len() as u64);
        let batch_id = batch.id.clone();
        self.batches.insert(batch)?;

        if let Err(e) = self.write_tasks(&batch_id, specs) {
            self.discard_partial(&batch_id);
            return Err(LockstepError::InconsistentBatchCreation(format!(
                "batch '{}' discarded after task creation failed: {}",
                batch_id, e
            )));
        }

        let promoted = self
            .batches
            .modify(&batch_id, |b| b.advance_to(BatchStatus::Running, Utc::now()))?;
        let Some((batch, _)) = promoted else {
            // Reconciliation discarded the batch while tasks were being written.
            self.discard_partial(&batch_id);
            return Err(LockstepError::InconsistentBatchCreation(format!(
                "batch '{}' was discarded before its tasks were complete",
                batch_id
            )));
        };

        tracing::info!(batch_id = %batch_id, batch_type, total = batch.total_task_count, "batch submitted");
        record_event(
            &self.ctx,
            &Event::new(EventAction::BatchSubmit)
                .with_batch(&batch_id)
                .with_details(json!({
                    "batch_type": batch_type,
                    "total_task_count": batch.total_task_count,
                })),
        );

        self.refresh_batch(&batch_id)
    }

    fn write_tasks(&self, batch_id: &str, specs: Vec<TaskSpec>) -> Result<()> {
        for (seq, spec) in specs.into_iter().enumerate() {
            let seq = u32::try_from(seq).map_err(|_| {
                LockstepError::UserError("too many tasks in one batch".to_string())
            })?;
            self.tasks
                .insert(Task::new(batch_id, seq, spec, self.max_attempts))?;
        }
        Ok(())
    }

    fn discard_partial(&self, batch_id: &str) {
        if let Err(e) = self.tasks.delete_all(batch_id) {
            tracing::warn!(batch_id, error = %e, "failed to remove tasks of partial batch");
        }
        if let Err(e) = self.batches.delete(batch_id) {
            tracing::warn!(batch_id, error = %e, "failed to remove partial batch");
        }
    }

    /// Submit a batch and return its id.
    pub fn submit_batch(&self, batch_type: &str, params_list: Vec<Value>) -> Result<String> {
        Ok(self.create_batch(batch_type, params_list)?.id)
    }

    /// The stored batch record. Read only.
    pub fn get_status(&self, batch_id: &str) -> Result<Batch> {
        self.batches.require(batch_id)
    }

    pub fn get_batch_status(&self, batch_id: &str) -> Result<BatchStatusView> {
        Ok(BatchStatusView::from(&self.get_status(batch_id)?))
    }

    /// Request cancellation.
    ///
    /// Non-terminal batches move to `canceling`; in-flight tasks finish, no
    /// new tasks start, and the batch becomes `canceled` once nothing is
    /// running. Terminal batches are left unchanged.
    pub fn cancel(&self, batch_id: &str) -> Result<Batch> {
        let (_, changed) = self
            .batches
            .modify(batch_id, |b| b.advance_to(BatchStatus::Canceling, Utc::now()))?
            .ok_or_else(|| LockstepError::BatchNotFound(batch_id.to_string()))?;

        if changed {
            tracing::info!(batch_id, "batch cancel requested");
            record_event(
                &self.ctx,
                &Event::new(EventAction::BatchCancel).with_batch(batch_id),
            );
        }

        self.refresh_batch(batch_id)
    }

    pub fn cancel_batch(&self, batch_id: &str) -> Result<()> {
        self.cancel(batch_id).map(|_| ())
    }

    /// All batches in creation order.
    pub fn list_batches(&self) -> Result<Vec<Batch>> {
        self.batches.list()
    }

    /// Tasks of a batch in `seq` order.
    pub fn list_tasks(&self, batch_id: &str) -> Result<Vec<Task>> {
        self.batches.require(batch_id)?;
        self.tasks.list(batch_id)
    }

    /// Tasks of one type across all batches, processed or not.
    pub fn list_tasks_by_type(&self, task_type: &str, processed: bool) -> Result<Vec<Task>> {
        self.tasks.list_by_type(task_type, processed)
    }
}
