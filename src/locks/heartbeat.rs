//! Background lock renewal.

use super::manager::LockManager;
use super::types::{LockHandle, Renewal};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How a heartbeat ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The lock was still held when the heartbeat stopped.
    Held(LockHandle),
    /// A renewal returned `Lost`, or the handle expired before renewal
    /// succeeded.
    Lost,
}

/// Renews a lock every `interval` on a background thread.
///
/// The shared lost flag flips to `true` as soon as exclusivity is gone, so
/// long-running handlers can stop early.
#[derive(Debug)]
pub struct Heartbeat {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<Option<LockHandle>>>,
    lost: Arc<AtomicBool>,
}

impl Heartbeat {
    pub fn start(
        manager: LockManager,
        mut handle: LockHandle,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&lost);

        let thread = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return Some(handle),
                    Err(RecvTimeoutError::Timeout) => {}
                }

                match manager.renew(&mut handle, ttl) {
                    Ok(Renewal::Renewed(expires_on)) => {
                        tracing::debug!(key = %handle.key, %expires_on, "lock renewed");
                    }
                    Ok(Renewal::Lost) => {
                        tracing::warn!(lock_type = %handle.lock_type, key = %handle.key, "lock lost");
                        lost_flag.store(true, Ordering::SeqCst);
                        return None;
                    }
                    Err(e) => {
                        tracing::warn!(key = %handle.key, error = %e, "lock renewal failed, retrying");
                        if handle.is_expired() {
                            lost_flag.store(true, Ordering::SeqCst);
                            return None;
                        }
                    }
                }
            }
        });

        Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            lost,
        }
    }

    /// Shared flag set once the lock is lost.
    pub fn lost_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.lost)
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Stop renewing and report whether the lock is still held.
    ///
    /// A handle whose last known expiry has passed counts as lost.
    pub fn stop(mut self) -> HeartbeatOutcome {
        match self.shutdown() {
            Some(handle) if !handle.is_expired() => HeartbeatOutcome::Held(handle),
            _ => {
                self.lost.store(true, Ordering::SeqCst);
                HeartbeatOutcome::Lost
            }
        }
    }

    fn shutdown(&mut self) -> Option<LockHandle> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.thread.take().and_then(|t| t.join().ok().flatten())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.shutdown();
    }
}
