//! Task handler contract and registry.
//!
//! A handler executes one task type. Handlers are registered in code, keyed
//! by task type, and looked up by the worker for every claimed task:
//!
//! ```
//! use lockstep::handlers::{HandlerRegistry, handler_fn};
//! use serde_json::json;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("double", handler_fn(|_ctx, params| {
//!     let n = params["n"].as_i64().unwrap_or(0);
//!     Ok(json!({"n": n * 2}))
//! }))?;
//! assert!(registry.contains("double"));
//! # Ok::<(), lockstep::error::LockstepError>(())
//! ```
//!
//! Handlers must be idempotent with respect to their external effects:
//! tasks run at least once, and a task whose lock expired mid-run may be
//! executed again by another worker.

mod builtin;
mod context;

pub use builtin::{ExecHandler, NoopHandler, SleepHandler};
pub use context::TaskContext;

use crate::error::{LockstepError, Result};
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Executes tasks of one type.
pub trait TaskHandler: Send + Sync {
    /// Run the task. The returned value is stored as the task result.
    fn execute(&self, ctx: &TaskContext, params: &Value) -> anyhow::Result<Value>;
}

impl<F> TaskHandler for F
where
    F: Fn(&TaskContext, &Value) -> anyhow::Result<Value> + Send + Sync,
{
    fn execute(&self, ctx: &TaskContext, params: &Value) -> anyhow::Result<Value> {
        self(ctx, params)
    }
}

/// Pin a closure to the handler signature so its argument and error types
/// are inferred.
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(&TaskContext, &Value) -> anyhow::Result<Value> + Send + Sync,
{
    f
}

/// Task type → handler map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("task_types", &self.task_types())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `noop`, `sleep`, and `exec` handlers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert("noop", Arc::new(NoopHandler));
        registry.insert("sleep", Arc::new(SleepHandler));
        registry.insert("exec", Arc::new(ExecHandler));
        registry
    }

    fn insert(
        &mut self,
        task_type: &str,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(task_type.to_string(), handler)
    }

    /// Register `handler` for `task_type`, returning the handler it replaced.
    pub fn register<H>(
        &mut self,
        task_type: &str,
        handler: H,
    ) -> Result<Option<Arc<dyn TaskHandler>>>
    where
        H: TaskHandler + 'static,
    {
        if task_type.trim().is_empty() {
            return Err(LockstepError::UserError(
                "task type must not be empty".to_string(),
            ));
        }
        Ok(self.insert(task_type, Arc::new(handler)))
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Registered task types, sorted.
    pub fn task_types(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Run the handler for `task_type`.
    ///
    /// Handler errors and panics both become [`LockstepError::ExecutionError`];
    /// an unregistered type is [`LockstepError::UnknownTaskType`].
    pub fn dispatch(&self, task_type: &str, ctx: &TaskContext, params: &Value) -> Result<Value> {
        let handler = self
            .handlers
            .get(task_type)
            .ok_or_else(|| LockstepError::UnknownTaskType(task_type.to_string()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| handler.execute(ctx, params))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LockstepError::ExecutionError(format!("{:#}", e))),
            Err(payload) => Err(LockstepError::ExecutionError(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
