//! Implementation of the `lockstep work` command.
//!
//! Runs `--threads` workers with the built-in handlers. Without `--once` or
//! `--until-idle` the workers run until the process is killed; a killed
//! worker's task lock simply expires and another worker reclaims the task.

use crate::cli::WorkArgs;
use lockstep::context::require_initialized_store;
use lockstep::error::{LockstepError, Result};
use lockstep::handlers::HandlerRegistry;
use lockstep::worker::{IterationOutcome, Worker, WorkerStats};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::thread;

pub fn cmd_work(store: Option<&Path>, args: WorkArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    if args.threads == 0 {
        return Err(LockstepError::UserError(
            "--threads must be at least 1".to_string(),
        ));
    }

    let registry = Arc::new(HandlerRegistry::with_builtins());
    let workers = (0..args.threads)
        .map(|_| Worker::open(&ctx, Arc::clone(&registry)))
        .collect::<Result<Vec<_>>>()?;

    eprintln!(
        "Starting {} worker(s) on {} (handlers: {})",
        workers.len(),
        ctx.root.display(),
        registry.task_types().join(", ")
    );

    if args.once {
        for worker in &workers {
            let outcome = worker.run_once()?;
            println!("{}", describe(&outcome));
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let until_idle = args.until_idle;
    let handles: Vec<_> = workers
        .into_iter()
        .map(|worker| {
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || {
                if until_idle {
                    worker.run_until_idle()
                } else {
                    Ok(worker.run(&shutdown))
                }
            })
        })
        .collect();

    let mut total = WorkerStats::default();
    let mut first_error = None;
    for handle in handles {
        match handle.join() {
            Ok(Ok(stats)) => total.merge(&stats),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(_) => {
                first_error.get_or_insert(LockstepError::UserError(
                    "worker thread panicked".to_string(),
                ));
            }
        }
    }

    print_summary(&total);
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn describe(outcome: &IterationOutcome) -> String {
    match outcome {
        IterationOutcome::Idle => "idle: nothing to claim".to_string(),
        IterationOutcome::Contended => "contended: another worker took the task".to_string(),
        IterationOutcome::Completed(id) => format!("completed: {}", id),
        IterationOutcome::Retrying(id) => format!("failed, will retry: {}", id),
        IterationOutcome::Failed(id) => format!("failed: {}", id),
        IterationOutcome::Lost(id) => format!("lock lost, outcome discarded: {}", id),
        IterationOutcome::Skipped(id) => format!("skipped: {}", id),
    }
}

fn print_summary(stats: &WorkerStats) {
    println!(
        "Completed: {}  Retried: {}  Failed: {}  Lost: {}  Contended: {}  Errors: {}",
        stats.completed, stats.retried, stats.failed, stats.lost, stats.contended, stats.errors
    );
}
