//! CLI argument parsing for lockstep.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Lockstep: batch task processing coordinated through a shared store.
///
/// Batches of tasks are written to a store directory that every worker can
/// see. Workers claim tasks under expiring locks, run them through
/// registered handlers, and report the outcome back to the store.
#[derive(Parser, Debug)]
#[command(name = "lockstep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Store directory (defaults to $LOCKSTEP_STORE, then ./.lockstep).
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for lockstep.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a store.
    ///
    /// Creates the store layout and a default `config.yaml`. Idempotent.
    Init,

    /// Submit a batch of tasks.
    ///
    /// Every task gets the batch type as its task type. Prints the batch id.
    Submit(SubmitArgs),

    /// Show batch progress.
    ///
    /// With a batch id, shows that batch; otherwise lists all batches.
    Status(StatusArgs),

    /// Show the tasks of a batch.
    Show(ShowArgs),

    /// List tasks of one type across all batches.
    ///
    /// Lists unprocessed tasks (queued, retrying or failed) unless
    /// `--processed` is given.
    Tasks(TasksArgs),

    /// Request cancellation of a batch.
    ///
    /// Running tasks finish; no new tasks start.
    Cancel(CancelArgs),

    /// Run workers with the built-in handlers.
    Work(WorkArgs),

    /// Lock management commands.
    ///
    /// List or clear locks.
    Lock(LockCommand),

    /// Diagnose store health.
    ///
    /// Reports expired locks, stale pending batches, exhausted tasks and
    /// orphaned task directories.
    Doctor(DoctorArgs),

    /// Delete finished batches.
    Clean(CleanArgs),
}

/// Arguments for the `submit` command.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Batch type, also used as the task type of every task.
    pub batch_type: String,

    /// JSON params for one task (repeatable).
    #[arg(long = "param", value_name = "JSON")]
    pub params: Vec<String>,

    /// File with one JSON params object per line.
    #[arg(long, value_name = "FILE")]
    pub params_file: Option<PathBuf>,
}

/// Arguments for the `status` command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Batch ID (all batches if omitted).
    pub batch_id: Option<String>,
}

/// Arguments for the `show` command.
#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Batch ID.
    pub batch_id: String,
}

/// Arguments for the `tasks` command.
#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Task type.
    pub task_type: String,

    /// List processed tasks instead of unprocessed ones.
    #[arg(long)]
    pub processed: bool,
}

/// Arguments for the `cancel` command.
#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Batch ID.
    pub batch_id: String,
}

/// Arguments for the `work` command.
#[derive(Args, Debug)]
pub struct WorkArgs {
    /// Run a single iteration per worker and exit.
    #[arg(long, conflicts_with = "until_idle")]
    pub once: bool,

    /// Exit once no task is claimable.
    #[arg(long)]
    pub until_idle: bool,

    /// Number of worker threads.
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
}

/// Lock subcommands.
#[derive(Args, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Lock subcommand actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List live locks.
    List(LockListArgs),

    /// Clear a lock.
    ///
    /// The holder, if still running, loses the lock at its next renewal and
    /// its outcome is discarded.
    Clear(LockClearArgs),
}

/// Arguments for `lock list`.
#[derive(Args, Debug)]
pub struct LockListArgs {
    /// Include expired records.
    #[arg(long)]
    pub all: bool,
}

/// Arguments for `lock clear`.
#[derive(Args, Debug)]
pub struct LockClearArgs {
    /// Lock type (e.g. `task`).
    pub lock_type: String,

    /// Lock key (e.g. a task id).
    pub key: String,

    /// Required: clearing a live lock breaks mutual exclusion for its holder.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `doctor` command.
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Run a maintenance pass and remove orphaned task directories.
    #[arg(long)]
    pub repair: bool,
}

/// Arguments for the `clean` command.
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Batch ID to delete.
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub batch_id: Option<String>,

    /// Delete every completed, failed or canceled batch.
    #[arg(long)]
    pub all: bool,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_tasks_by_type() {
        let cli = Cli::try_parse_from(["lockstep", "tasks", "exec", "--processed"]).unwrap();
        match cli.command {
            Command::Tasks(args) => {
                assert_eq!(args.task_type, "exec");
                assert!(args.processed);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_submit_with_params() {
        let cli = Cli::try_parse_from([
            "lockstep",
            "--store",
            "/tmp/s",
            "submit",
            "exec",
            "--param",
            r#"{"command":"true"}"#,
            "--param",
            "{}",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Command::Submit(args) => {
                assert_eq!(args.batch_type, "exec");
                assert_eq!(args.params.len(), 2);
                assert!(args.params_file.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["lockstep", "status", "--log-json", "--store", "x"]).unwrap();
        assert!(cli.log_json);
        assert_eq!(cli.store, Some(PathBuf::from("x")));
    }

    #[test]
    fn work_once_conflicts_with_until_idle() {
        assert!(Cli::try_parse_from(["lockstep", "work", "--once", "--until-idle"]).is_err());

        let cli = Cli::try_parse_from(["lockstep", "work", "--threads", "4"]).unwrap();
        match cli.command {
            Command::Work(args) => {
                assert_eq!(args.threads, 4);
                assert!(!args.once && !args.until_idle);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn clean_requires_id_or_all() {
        assert!(Cli::try_parse_from(["lockstep", "clean"]).is_err());
        assert!(Cli::try_parse_from(["lockstep", "clean", "abc", "--all"]).is_err());
        assert!(Cli::try_parse_from(["lockstep", "clean", "--all"]).is_ok());
    }

    #[test]
    fn lock_clear_parses() {
        let cli =
            Cli::try_parse_from(["lockstep", "lock", "clear", "task", "0190-abc", "--force"]).unwrap();
        match cli.command {
            Command::Lock(LockCommand {
                action: LockAction::Clear(args),
            }) => {
                assert_eq!(args.lock_type, "task");
                assert_eq!(args.key, "0190-abc");
                assert!(args.force);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
