//! Worker loop: claim a task, lock it, execute it, report it.
//!
//! A worker shares nothing with other workers except the store. Each
//! iteration re-reads batches and tasks, takes the task lock, re-checks
//! eligibility under the lock, and only then starts an attempt. Reports are
//! fenced on the attempt number, so an execution whose lock expired can never
//! overwrite the outcome of a newer attempt.

mod claim;
mod execute;
mod maintenance;

pub use maintenance::{MaintenanceReport, StoreHealth};

use crate::batch::BatchStore;
use crate::config::Config;
use crate::context::StoreContext;
use crate::coordinator::BatchCoordinator;
use crate::error::{LockstepError, Result};
use crate::handlers::HandlerRegistry;
use crate::locks::LockManager;
use crate::task::TaskStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Sleep granularity while idling, so shutdown requests are noticed quickly.
const IDLE_SLICE: Duration = Duration::from_millis(50);

/// Timing knobs for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    pub lock_ttl: Duration,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub maintenance_interval: Duration,
    pub pending_grace: Duration,
}

impl WorkerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            lock_ttl: config.lock_ttl(),
            heartbeat_interval: config.heartbeat_interval(),
            poll_interval: config.poll_interval(),
            maintenance_interval: config.maintenance_interval(),
            pending_grace: config.pending_grace(),
        }
    }
}

impl WorkerOptions {
    /// Reject timings under which a held lock could expire between renewals.
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl.is_zero() {
            return Err(LockstepError::UserError(
                "worker options: lock_ttl must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() || self.heartbeat_interval >= self.lock_ttl {
            return Err(LockstepError::UserError(format!(
                "worker options: heartbeat_interval ({:?}) must be greater than zero and \
                 less than lock_ttl ({:?})",
                self.heartbeat_interval, self.lock_ttl
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(LockstepError::UserError(
                "worker options: poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How one loop iteration ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing claimable.
    Idle,
    /// Another worker won the lock for the chosen task.
    Contended,
    /// The task was processed.
    Completed(String),
    /// The attempt failed; attempts remain.
    Retrying(String),
    /// The task is now terminally failed.
    Failed(String),
    /// The lock was lost mid-execution; nothing was reported.
    Lost(String),
    /// The task or its batch stopped being eligible after locking.
    Skipped(String),
}

impl IterationOutcome {
    pub fn task_id(&self) -> Option<&str> {
        match self {
            IterationOutcome::Idle | IterationOutcome::Contended => None,
            IterationOutcome::Completed(id)
            | IterationOutcome::Retrying(id)
            | IterationOutcome::Failed(id)
            | IterationOutcome::Lost(id)
            | IterationOutcome::Skipped(id) => Some(id),
        }
    }
}

/// Outcome counters for one worker run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
    pub lost: u64,
    pub contended: u64,
    pub skipped: u64,
    pub errors: u64,
    pub maintenance_runs: u64,
}

impl WorkerStats {
    pub fn record(&mut self, outcome: &IterationOutcome) {
        match outcome {
            IterationOutcome::Idle => {}
            IterationOutcome::Contended => self.contended += 1,
            IterationOutcome::Completed(_) => self.completed += 1,
            IterationOutcome::Retrying(_) => self.retried += 1,
            IterationOutcome::Failed(_) => self.failed += 1,
            IterationOutcome::Lost(_) => self.lost += 1,
            IterationOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Attempts that ran a handler to completion and were reported.
    pub fn executed(&self) -> u64 {
        self.completed + self.retried + self.failed
    }

    pub fn merge(&mut self, other: &WorkerStats) {
        self.completed += other.completed;
        self.retried += other.retried;
        self.failed += other.failed;
        self.lost += other.lost;
        self.contended += other.contended;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.maintenance_runs += other.maintenance_runs;
    }
}

/// One worker. Cheap to construct; run several in threads or processes.
#[derive(Debug)]
pub struct Worker {
    ctx: StoreContext,
    options: WorkerOptions,
    registry: Arc<HandlerRegistry>,
    locks: LockManager,
    batches: BatchStore,
    tasks: TaskStore,
    coordinator: BatchCoordinator,
}

impl Worker {
    /// Fails if `options` would let a held lock lapse between renewals.
    pub fn new(
        ctx: &StoreContext,
        options: WorkerOptions,
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            ctx: ctx.clone(),
            options,
            registry,
            locks: LockManager::new(ctx),
            batches: BatchStore::new(ctx),
            tasks: TaskStore::new(ctx),
            // Workers only refresh and reconcile; max_attempts is unused here.
            coordinator: BatchCoordinator::new(ctx, &Config::default())?,
        })
    }

    /// Worker configured from the store's `config.yaml`.
    pub fn open(ctx: &StoreContext, registry: Arc<HandlerRegistry>) -> Result<Self> {
        let config = Config::load_or_default(ctx.config_path())?;
        Self::new(ctx, WorkerOptions::from_config(&config), registry)
    }

    /// Identity written into the locks this worker takes.
    pub fn owner(&self) -> &str {
        self.locks.owner()
    }

    pub fn options(&self) -> &WorkerOptions {
        &self.options
    }

    /// Run a single claim/execute/report iteration.
    pub fn run_once(&self) -> Result<IterationOutcome> {
        let Some(claimed) = self.claim_next()? else {
            return Ok(IterationOutcome::Idle);
        };
        match claimed {
            claim::Claim::Contended => Ok(IterationOutcome::Contended),
            claim::Claim::Skipped(task_id) => Ok(IterationOutcome::Skipped(task_id)),
            claim::Claim::Started(started) => self.execute(started),
        }
    }

    /// Run until `shutdown` is set.
    ///
    /// Idle iterations sleep for `poll_interval`; errors are logged and
    /// counted, then the loop backs off for one poll interval.
    pub fn run(&self, shutdown: &AtomicBool) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut last_maintenance: Option<Instant> = None;

        tracing::info!(owner = %self.owner(), "worker started");
        while !shutdown.load(Ordering::SeqCst) {
            self.maintain_if_due(&mut last_maintenance, &mut stats);

            match self.run_once() {
                Ok(outcome) => {
                    stats.record(&outcome);
                    if outcome == IterationOutcome::Idle {
                        self.idle(shutdown);
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::error!(owner = %self.owner(), error = %e, "worker iteration failed");
                    self.idle(shutdown);
                }
            }
        }
        tracing::info!(owner = %self.owner(), completed = stats.completed, "worker stopped");
        stats
    }

    /// Run until the first idle iteration, then return.
    ///
    /// Maintenance runs once up front. Errors stop the run.
    pub fn run_until_idle(&self) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        if self.maintain()?.is_some() {
            stats.maintenance_runs += 1;
        }
        loop {
            let outcome = self.run_once()?;
            stats.record(&outcome);
            if outcome == IterationOutcome::Idle {
                return Ok(stats);
            }
        }
    }

    fn maintain_if_due(&self, last: &mut Option<Instant>, stats: &mut WorkerStats) {
        let due = last.is_none_or(|at| at.elapsed() >= self.options.maintenance_interval);
        if !due {
            return;
        }
        *last = Some(Instant::now());
        match self.maintain() {
            Ok(Some(_)) => stats.maintenance_runs += 1,
            Ok(None) => {}
            Err(e) => {
                stats.errors += 1;
                tracing::warn!(error = %e, "maintenance failed");
            }
        }
    }

    fn idle(&self, shutdown: &AtomicBool) {
        let deadline = Instant::now() + self.options.poll_interval;
        while !shutdown.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(IDLE_SLICE.min(deadline - now));
        }
    }
}
