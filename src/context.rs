//! Store context resolution for lockstep.
//!
//! Every worker process, and every CLI invocation, resolves the same shared
//! store directory and derives all table paths from it. Nothing else is
//! shared between processes.
//!
//! # Layout
//!
//! ```text
//! {root}/
//!   config.yaml
//!   locks/{lock_type}/{key}.json
//!   batches/{batch_id}.json
//!   tasks/{batch_id}/{task_id}.json
//!   events/events.ndjson
//! ```

use crate::error::{LockstepError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming the store directory.
pub const STORE_ENV_VAR: &str = "LOCKSTEP_STORE";

/// Default store directory relative to the working directory.
pub const DEFAULT_STORE_DIR: &str = ".lockstep";

/// Resolved paths of a lockstep store. All paths are absolute.
#[derive(Debug, Clone)]
pub struct StoreContext {
    /// Store root directory.
    pub root: PathBuf,

    /// Lock table root (`{root}/locks/`), one subdirectory per lock type.
    pub locks_dir: PathBuf,

    /// Batch table (`{root}/batches/`).
    pub batches_dir: PathBuf,

    /// Task table root (`{root}/tasks/`), one subdirectory per batch.
    pub tasks_dir: PathBuf,

    /// Event log directory (`{root}/events/`).
    pub events_dir: PathBuf,
}

impl StoreContext {
    /// Resolve the store from an explicit path, `LOCKSTEP_STORE`, or
    /// `./.lockstep`, in that order.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::at(path);
        }

        if let Ok(path) = env::var(STORE_ENV_VAR)
            && !path.trim().is_empty()
        {
            return Self::at(path.trim());
        }

        let cwd = env::current_dir().map_err(|e| {
            LockstepError::UserError(format!("failed to get current working directory: {}", e))
        })?;
        Self::at(cwd.join(DEFAULT_STORE_DIR))
    }

    /// Build a context rooted at `root` (made absolute against the cwd).
    pub fn at<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            env::current_dir()
                .map_err(|e| {
                    LockstepError::UserError(format!(
                        "failed to get current working directory: {}",
                        e
                    ))
                })?
                .join(root)
        };

        Ok(Self {
            locks_dir: root.join("locks"),
            batches_dir: root.join("batches"),
            tasks_dir: root.join("tasks"),
            events_dir: root.join("events"),
            root,
        })
    }

    /// Path to `config.yaml`.
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// Directory holding the locks of one lock type.
    pub fn lock_type_dir(&self, lock_type: &str) -> PathBuf {
        self.locks_dir.join(lock_type)
    }

    /// Directory holding the tasks of one batch.
    pub fn batch_tasks_dir(&self, batch_id: &str) -> PathBuf {
        self.tasks_dir.join(batch_id)
    }

    /// Whether the store layout exists.
    pub fn is_initialized(&self) -> bool {
        self.root.is_dir() && self.batches_dir.is_dir() && self.locks_dir.is_dir()
    }

    /// Create the store layout. Existing content is left untouched.
    pub fn create_layout(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.locks_dir,
            &self.batches_dir,
            &self.tasks_dir,
            &self.events_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| {
                LockstepError::StoreError(format!(
                    "failed to create directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Ensure the store is initialized, returning a helpful error if not.
    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(LockstepError::UserError(format!(
                "lockstep store not initialized.\n\
                 Expected store at: {}\n\n\
                 Run `lockstep init` (or pass --store / set {}) first.",
                self.root.display(),
                STORE_ENV_VAR
            )));
        }
        Ok(())
    }
}

/// Resolve the store and require it to be initialized.
pub fn require_initialized_store(explicit: Option<&Path>) -> Result<StoreContext> {
    let ctx = StoreContext::resolve(explicit)?;
    ctx.ensure_initialized()?;
    Ok(ctx)
}
