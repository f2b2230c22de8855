//! Per-execution context handed to handlers.

use crate::error::{LockstepError, Result};
use crate::task::Task;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// What a handler knows about the task it is running.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub batch_id: String,
    pub task_type: String,
    /// 1-based number of this attempt.
    pub attempt: u32,
    pub max_attempts: u32,
    lock_lost: Arc<AtomicBool>,
}

impl TaskContext {
    /// Context for an attempt of `task`, watching the heartbeat's lost flag.
    pub fn new(task: &Task, lock_lost: Arc<AtomicBool>) -> Self {
        Self {
            task_id: task.id.clone(),
            batch_id: task.batch_id.clone(),
            task_type: task.task_type.clone(),
            attempt: task.attempts,
            max_attempts: task.max_attempts,
            lock_lost,
        }
    }

    /// Context not tied to any lock (running a handler directly).
    pub fn detached(task_id: &str, batch_id: &str, task_type: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            batch_id: batch_id.to_string(),
            task_type: task_type.to_string(),
            attempt: 1,
            max_attempts: 1,
            lock_lost: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the task lock was lost; the outcome will be discarded.
    pub fn is_lock_lost(&self) -> bool {
        self.lock_lost.load(Ordering::SeqCst)
    }

    /// Error out once the task lock is lost, so long handlers stop early.
    pub fn ensure_lock_held(&self) -> Result<()> {
        if self.is_lock_lost() {
            return Err(LockstepError::LockLost(format!(
                "task '{}' lock lost during attempt {}",
                self.task_id, self.attempt
            )));
        }
        Ok(())
    }
}
