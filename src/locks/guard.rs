//! RAII lock guard implementation.

use super::manager::LockManager;
use super::types::{LockHandle, Release};
use crate::error::Result;

/// RAII guard for a held lock.
///
/// When dropped, the lock is released (token-checked). If release fails, a
/// warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    handle: LockHandle,

    /// Whether the lock has been released or abandoned manually.
    released: bool,
}

impl LockGuard {
    pub fn new(manager: LockManager, handle: LockHandle) -> Self {
        Self {
            manager,
            handle,
            released: false,
        }
    }

    /// The underlying handle.
    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    pub fn key(&self) -> &str {
        &self.handle.key
    }

    /// Manually release the lock and report whether it was still held.
    pub fn release(mut self) -> Result<Release> {
        self.released = true;
        self.manager.release(&self.handle)
    }

    /// Give up the guard without releasing; the record expires on its own.
    pub fn abandon(mut self) -> LockHandle {
        self.released = true;
        self.handle.clone()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released
            && let Err(e) = self.manager.release(&self.handle)
        {
            tracing::warn!(
                lock_type = %self.handle.lock_type,
                key = %self.handle.key,
                error = %e,
                "failed to release lock"
            );
        }
    }
}
