//! Implementation of the `lockstep doctor` command.
//!
//! # Read-only mode (default)
//!
//! Reports:
//! - Expired lock records (holders that crashed or stalled)
//! - Pending batches older than the grace period (interrupted submissions)
//! - Exhausted tasks (final attempt never reported)
//! - Task directories whose batch no longer exists
//!
//! # Repair mode (`--repair`)
//!
//! Runs one maintenance pass, then removes orphaned task directories.

use crate::cli::DoctorArgs;
use lockstep::context::require_initialized_store;
use lockstep::coordinator::BatchCoordinator;
use lockstep::error::{LockstepError, Result};
use lockstep::handlers::HandlerRegistry;
use lockstep::worker::{StoreHealth, Worker};
use std::path::Path;
use std::sync::Arc;

pub fn cmd_doctor(store: Option<&Path>, args: DoctorArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let worker = Worker::open(&ctx, Arc::new(HandlerRegistry::new()))?;

    let health = worker.inspect()?;
    print_health(&health);

    if !args.repair {
        if !health.is_healthy() {
            println!();
            println!("Run `lockstep doctor --repair` to apply repairs.");
        }
        return Ok(());
    }

    let Some(report) = worker.maintain()? else {
        return Err(LockstepError::LockError(
            "another process is running maintenance; try again shortly".to_string(),
        ));
    };
    let orphans = BatchCoordinator::open(&ctx)?.remove_orphaned_tasks()?;

    println!();
    println!("Repairs applied:");
    println!("  - purged {} expired lock(s)", report.purged_locks);
    println!("  - failed {} exhausted task(s)", report.exhausted.len());
    println!(
        "  - promoted {} and discarded {} pending batch(es)",
        report.reconciled.promoted.len(),
        report.reconciled.discarded.len()
    );
    println!("  - finished {} batch(es)", report.finished.len());
    println!("  - removed {} orphaned task director(y/ies)", orphans);
    Ok(())
}

fn print_health(health: &StoreHealth) {
    if health.is_healthy() {
        println!("Store is healthy. No issues detected.");
        return;
    }

    println!("Issues detected:");
    println!();
    for record in &health.expired_locks {
        println!("  [expired lock] {}", record);
    }
    for batch in &health.stale_pending {
        println!(
            "  [stale pending] batch {} ({} task(s) expected, created {})",
            batch.id,
            batch.total_task_count,
            batch.created_on.to_rfc3339()
        );
    }
    for task in &health.exhausted_tasks {
        println!(
            "  [exhausted] task {} of batch {} ({}/{} attempts, never reported)",
            task.id, task.batch_id, task.attempts, task.max_attempts
        );
    }
    for batch_id in &health.orphaned_task_batches {
        println!("  [orphaned tasks] tasks/{}/ has no batch record", batch_id);
    }
}
