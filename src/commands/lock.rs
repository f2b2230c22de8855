//! Implementation of the `lockstep lock` subcommands.

use crate::cli::{LockClearArgs, LockListArgs};
use lockstep::context::require_initialized_store;
use lockstep::error::{LockstepError, Result};
use lockstep::events::{Event, EventAction, record_event};
use lockstep::locks::LockManager;
use serde_json::json;
use std::path::Path;

pub fn cmd_lock_list(store: Option<&Path>, args: LockListArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let records = LockManager::new(&ctx).list(args.all)?;

    if records.is_empty() {
        println!("No {}locks.", if args.all { "" } else { "active " });
        return Ok(());
    }

    println!("Locks ({}):", records.len());
    println!();
    for record in &records {
        println!("  {}", record);
    }
    Ok(())
}

pub fn cmd_lock_clear(store: Option<&Path>, args: LockClearArgs) -> Result<()> {
    if !args.force {
        return Err(LockstepError::UserError(format!(
            "refusing to clear lock {}/{} without --force.\n\
             If its holder is still running it loses the lock and its outcome is discarded.",
            args.lock_type, args.key
        )));
    }

    let ctx = require_initialized_store(store)?;
    let Some(record) = LockManager::new(&ctx).clear(&args.lock_type, &args.key)? else {
        return Err(LockstepError::LockError(format!(
            "no lock record for {}/{}",
            args.lock_type, args.key
        )));
    };

    tracing::warn!(lock_type = %record.lock_type, key = %record.key, owner = %record.owner, "lock cleared");
    record_event(
        &ctx,
        &Event::new(EventAction::LockClear).with_details(json!({
            "lock_type": record.lock_type,
            "key": record.key,
            "owner": record.owner,
            "was_live": record.is_live(),
            "age": record.age_string(),
        })),
    );

    println!("Cleared lock: {}", record);
    Ok(())
}
