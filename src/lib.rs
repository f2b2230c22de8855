//! Lockstep: batch task processing with distributed expiring locks.
//!
//! Work is submitted as batches of tasks into a store directory shared by
//! every worker. Workers claim tasks under `(lock_type, key)` locks with a
//! TTL, renew them while a handler runs, and report outcomes with writes
//! fenced on the attempt number. A crashed worker's lock expires and the
//! task is retried elsewhere, so tasks run at least once and never twice at
//! the same time.
//!
//! The main entry points are [`coordinator::BatchCoordinator`] for
//! submitting and tracking batches, [`handlers::HandlerRegistry`] for
//! registering task handlers, and [`worker::Worker`] for processing.

pub mod batch;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod fs;
pub mod handlers;
pub mod locks;
pub mod logging;
pub mod store;
pub mod task;
pub mod worker;

#[cfg(test)]
mod test_support;
