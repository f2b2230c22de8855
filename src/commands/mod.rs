//! Command implementations for lockstep.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Commands print human-readable output to stdout; logs
//! and errors go to stderr.

mod batch;
mod doctor;
mod init;
mod lock;
mod submit;
mod work;


use crate::cli::{Command, LockAction, LockCommand};
use lockstep::error::Result;
use std::path::Path;

/// Dispatch a command to its implementation.
///
/// `store` is the `--store` override; every command resolves the store
/// from it (then `LOCKSTEP_STORE`, then `./.lockstep`).
pub fn dispatch(store: Option<&Path>, command: Command) -> Result<()> {
    match command {
        Command::Init => init::cmd_init(store),
        Command::Submit(args) => submit::cmd_submit(store, args),
        Command::Status(args) => batch::cmd_status(store, args),
        Command::Show(args) => batch::cmd_show(store, args),
        Command::Tasks(args) => batch::cmd_tasks(store, args),
        Command::Cancel(args) => batch::cmd_cancel(store, args),
        Command::Work(args) => work::cmd_work(store, args),
        Command::Lock(lock_cmd) => dispatch_lock(store, lock_cmd),
        Command::Doctor(args) => doctor::cmd_doctor(store, args),
        Command::Clean(args) => batch::cmd_clean(store, args),
    }
}

/// Dispatch lock subcommands.
fn dispatch_lock(store: Option<&Path>, lock_cmd: LockCommand) -> Result<()> {
    match lock_cmd.action {
        LockAction::List(args) => lock::cmd_lock_list(store, args),
        LockAction::Clear(args) => lock::cmd_lock_clear(store, args),
    }
}
