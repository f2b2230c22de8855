//! Per-record write guard.

use crate::error::{LockstepError, Result};
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// Exclusive OS file lock held for the duration of one conditional write.
///
/// Unlike the expiring locks in [`crate::locks`], this guard lives for
/// microseconds and is released by the OS if the holder dies, so it needs no
/// expiry. The lock is released when the guard (and its file handle) drops.
#[derive(Debug)]
pub(super) struct RecordGuard {
    _file: File,
}

impl RecordGuard {
    /// Block until the guard file at `path` is exclusively locked.
    pub(super) fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                LockstepError::StoreError(format!(
                    "failed to create guard directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                LockstepError::StoreError(format!(
                    "failed to open guard '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        file.lock().map_err(|e| {
            LockstepError::StoreError(format!(
                "failed to lock guard '{}': {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self { _file: file })
    }
}
