//! Batch inspection and lifecycle commands: `status`, `show`, `tasks`,
//! `cancel` and `clean`.

use crate::cli::{CancelArgs, CleanArgs, ShowArgs, StatusArgs, TasksArgs};
use lockstep::batch::Batch;
use lockstep::context::require_initialized_store;
use lockstep::coordinator::BatchCoordinator;
use lockstep::error::Result;
use std::path::Path;

/// Longest `last_error` excerpt printed by `show`.
const ERROR_EXCERPT_CHARS: usize = 80;

pub fn cmd_status(store: Option<&Path>, args: StatusArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let coordinator = BatchCoordinator::open(&ctx)?;

    if let Some(batch_id) = args.batch_id {
        print_batch(&coordinator.get_status(&batch_id)?);
        return Ok(());
    }

    let batches = coordinator.list_batches()?;
    if batches.is_empty() {
        println!("No batches.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<12}  {:<10}  {:>9}  {:>6}  CREATED",
        "ID", "TYPE", "STATUS", "DONE", "FAILED"
    );
    for batch in &batches {
        println!(
            "{:<36}  {:<12}  {:<10}  {:>9}  {:>6}  {}",
            batch.id,
            truncate(&batch.batch_type, 12),
            batch.status,
            format!("{}/{}", batch.finished_task_count(), batch.total_task_count),
            batch.failed_task_count,
            batch.created_on.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn print_batch(batch: &Batch) {
    println!("Batch:     {}", batch.id);
    println!("Type:      {}", batch.batch_type);
    println!("Status:    {}", batch.status);
    println!("Total:     {}", batch.total_task_count);
    println!("Processed: {}", batch.processed_task_count);
    println!("Failed:    {}", batch.failed_task_count);
    println!("Created:   {}", batch.created_on.to_rfc3339());
    println!("Updated:   {}", batch.updated_on.to_rfc3339());
    if let Some(completed_on) = batch.completed_on {
        println!("Completed: {}", completed_on.to_rfc3339());
    }
}

pub fn cmd_show(store: Option<&Path>, args: ShowArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let coordinator = BatchCoordinator::open(&ctx)?;

    let batch = coordinator.get_status(&args.batch_id)?;
    let tasks = coordinator.list_tasks(&args.batch_id)?;

    print_batch(&batch);
    println!();

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    println!(
        "{:>5}  {:<36}  {:<12}  {:<9}  {:>8}  LAST ERROR",
        "SEQ", "TASK", "TYPE", "STATE", "ATTEMPTS"
    );
    for task in &tasks {
        let last_error = task
            .last_error
            .as_deref()
            .map(|e| truncate(e.lines().next().unwrap_or(""), ERROR_EXCERPT_CHARS))
            .unwrap_or_default();
        println!(
            "{:>5}  {:<36}  {:<12}  {:<9}  {:>8}  {}",
            task.seq,
            task.id,
            truncate(&task.task_type, 12),
            task.status_label(),
            format!("{}/{}", task.attempts, task.max_attempts),
            last_error
        );
    }
    Ok(())
}

pub fn cmd_tasks(store: Option<&Path>, args: TasksArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let coordinator = BatchCoordinator::open(&ctx)?;
    let tasks = coordinator.list_tasks_by_type(&args.task_type, args.processed)?;

    let state = if args.processed { "processed" } else { "unprocessed" };
    if tasks.is_empty() {
        println!("No {} tasks of type '{}'.", state, args.task_type);
        return Ok(());
    }

    println!("{} {} task(s) of type '{}':", tasks.len(), state, args.task_type);
    println!();
    println!(
        "{:<36}  {:>5}  {:<36}  {:<9}  {:>8}",
        "BATCH", "SEQ", "TASK", "STATE", "ATTEMPTS"
    );
    for task in &tasks {
        println!(
            "{:<36}  {:>5}  {:<36}  {:<9}  {:>8}",
            task.batch_id,
            task.seq,
            task.id,
            task.status_label(),
            format!("{}/{}", task.attempts, task.max_attempts)
        );
    }
    Ok(())
}

pub fn cmd_cancel(store: Option<&Path>, args: CancelArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let coordinator = BatchCoordinator::open(&ctx)?;

    let batch = coordinator.cancel(&args.batch_id)?;
    println!("Batch {} is {}.", batch.id, batch.status);
    if !batch.status.is_terminal() {
        println!("Running tasks will finish; no new tasks will start.");
    }
    Ok(())
}

pub fn cmd_clean(store: Option<&Path>, args: CleanArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let coordinator = BatchCoordinator::open(&ctx)?;

    if let Some(batch_id) = args.batch_id {
        coordinator.delete_batch(&batch_id)?;
        println!("Deleted batch {}.", batch_id);
        return Ok(());
    }

    let finished: Vec<Batch> = coordinator
        .list_batches()?
        .into_iter()
        .filter(|b| b.status.is_terminal())
        .collect();
    for batch in &finished {
        coordinator.delete_batch(&batch.id)?;
        println!("Deleted batch {} ({}).", batch.id, batch.status);
    }
    let orphans = coordinator.remove_orphaned_tasks()?;

    println!();
    println!(
        "Deleted {} batch(es); removed {} orphaned task director{}.",
        finished.len(),
        orphans,
        if orphans == 1 { "y" } else { "ies" }
    );
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
