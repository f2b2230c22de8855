//! Built-in generic handlers for operating the CLI.
//!
//! - `noop`: returns its params unchanged
//! - `sleep`: `{"millis": n}`, stops early if the task lock is lost
//! - `exec`: `{"command": "...", "timeout_secs": n, "cwd": "..."}` runs a
//!   command (no shell; parsed with shell-words). Output goes to unnamed
//!   temp files, so a grandchild holding stdout open cannot delay the
//!   timeout or the kill on lock loss.

use super::{TaskContext, TaskHandler};
use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// How often long-running built-ins check for lock loss.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured output is trimmed to this many trailing bytes.
const OUTPUT_TAIL_BYTES: usize = 4096;

/// Echoes its params as the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl TaskHandler for NoopHandler {
    fn execute(&self, _ctx: &TaskContext, params: &Value) -> anyhow::Result<Value> {
        Ok(params.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SleepParams {
    millis: u64,
}

/// Sleeps for `millis` milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepHandler;

impl TaskHandler for SleepHandler {
    fn execute(&self, ctx: &TaskContext, params: &Value) -> anyhow::Result<Value> {
        let params: SleepParams =
            serde_json::from_value(params.clone()).context("invalid sleep params")?;

        let deadline = Instant::now() + Duration::from_millis(params.millis);
        loop {
            ctx.ensure_lock_held()?;
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }

        Ok(json!({"slept_ms": params.millis}))
    }
}

#[derive(Debug, Deserialize)]
struct ExecParams {
    command: String,
    #[serde(default)]
    timeout_secs: Option<u64>,
    #[serde(default)]
    cwd: Option<String>,
}

/// Runs an external command; a non-zero exit is a task failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecHandler;

impl TaskHandler for ExecHandler {
    fn execute(&self, ctx: &TaskContext, params: &Value) -> anyhow::Result<Value> {
        let params: ExecParams =
            serde_json::from_value(params.clone()).context("invalid exec params")?;

        let args = shell_words::split(&params.command)
            .with_context(|| format!("failed to parse command '{}'", params.command))?;
        let Some((program, rest)) = args.split_first() else {
            bail!("command is empty after parsing: '{}'", params.command);
        };

        let mut stdout = tempfile::tempfile().context("failed to create stdout capture file")?;
        let mut stderr = tempfile::tempfile().context("failed to create stderr capture file")?;

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?))
            .env("LOCKSTEP_TASK_ID", &ctx.task_id)
            .env("LOCKSTEP_BATCH_ID", &ctx.batch_id)
            .env("LOCKSTEP_ATTEMPT", ctx.attempt.to_string());
        if let Some(cwd) = &params.cwd {
            command.current_dir(cwd);
        }

        let start = Instant::now();
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to execute '{}'", program))?;

        // The parent's copies of the capture handles go away with `command`.
        drop(command);

        let timeout = params.timeout_secs.map(Duration::from_secs);
        let waited = wait_while_held(&mut child, ctx, timeout)?;
        let stdout = read_tail(&mut stdout);
        let stderr = read_tail(&mut stderr);

        let status = match waited {
            Wait::Exited(status) => status,
            Wait::TimedOut(limit) => bail!("command timed out after {}s", limit.as_secs()),
            Wait::LockLost => bail!("task '{}' lock lost; command killed", ctx.task_id),
        };

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!("command exited with status {}: {}", code, stderr.trim());
        }

        Ok(json!({
            "exit_code": status.code(),
            "duration_ms": start.elapsed().as_millis() as u64,
            "stdout": stdout,
        }))
    }
}

enum Wait {
    Exited(ExitStatus),
    TimedOut(Duration),
    LockLost,
}

/// Wait for a child, killing it on timeout or lock loss.
fn wait_while_held(
    child: &mut Child,
    ctx: &TaskContext,
    timeout: Option<Duration>,
) -> anyhow::Result<Wait> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Wait::Exited(status)),
            Ok(None) => {
                if let Some(limit) = timeout
                    && start.elapsed() >= limit
                {
                    kill_process(child);
                    return Ok(Wait::TimedOut(limit));
                }
                if ctx.is_lock_lost() {
                    kill_process(child);
                    return Ok(Wait::LockLost);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(e) => {
                kill_process(child);
                return Err(anyhow!("failed to check process status: {}", e));
            }
        }
    }
}

fn kill_process(child: &mut Child) {
    // On Unix this is SIGKILL; on Windows it is TerminateProcess.
    let _ = child.kill();
    let _ = child.wait();
}

/// The last `OUTPUT_TAIL_BYTES` written to a capture file so far.
fn read_tail(file: &mut File) -> String {
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    let start = len.saturating_sub(OUTPUT_TAIL_BYTES as u64);
    let mut buf = Vec::new();
    if file.seek(SeekFrom::Start(start)).is_ok() {
        let _ = file.by_ref().take(OUTPUT_TAIL_BYTES as u64).read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
