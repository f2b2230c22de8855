//! Implementation of the `lockstep submit` command.

use crate::cli::SubmitArgs;
use lockstep::context::require_initialized_store;
use lockstep::coordinator::BatchCoordinator;
use lockstep::error::{LockstepError, Result};
use serde_json::Value;
use std::path::Path;

pub fn cmd_submit(store: Option<&Path>, args: SubmitArgs) -> Result<()> {
    let ctx = require_initialized_store(store)?;
    let params_list = collect_params(&args.params, args.params_file.as_deref())?;

    let coordinator = BatchCoordinator::open(&ctx)?;
    let batch = coordinator.create_batch(&args.batch_type, params_list)?;

    eprintln!(
        "Submitted batch of {} '{}' task(s) ({})",
        batch.total_task_count, batch.batch_type, batch.status
    );
    println!("{}", batch.id);
    Ok(())
}

/// Task params from `--param` values followed by `--params-file` lines.
///
/// Blank lines in the file are skipped. At least one entry is required.
pub(super) fn collect_params(params: &[String], params_file: Option<&Path>) -> Result<Vec<Value>> {
    let mut list = Vec::with_capacity(params.len());
    for (i, raw) in params.iter().enumerate() {
        list.push(parse_json(raw, || format!("--param #{}", i + 1))?);
    }

    if let Some(path) = params_file {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LockstepError::UserError(format!(
                "failed to read params file '{}': {}",
                path.display(),
                e
            ))
        })?;
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            list.push(parse_json(line, || {
                format!("{} line {}", path.display(), n + 1)
            })?);
        }
    }

    if list.is_empty() {
        return Err(LockstepError::UserError(
            "no tasks given; pass --param <json> or --params-file <file>".to_string(),
        ));
    }
    Ok(list)
}

fn parse_json(raw: &str, source: impl FnOnce() -> String) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| LockstepError::UserError(format!("invalid JSON in {}: {}", source(), e)))
}
