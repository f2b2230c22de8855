//! Diagnostic logging setup.
//!
//! The filter is read from `LOCKSTEP_LOG`, then `RUST_LOG`, defaulting to
//! `info`. Output goes to stderr so command output on stdout stays scriptable.

use crate::error::{LockstepError, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the log filter (takes precedence over `RUST_LOG`).
pub const LOG_ENV_VAR: &str = "LOCKSTEP_LOG";

/// Build the env filter from `LOCKSTEP_LOG` / `RUST_LOG`.
fn build_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global tracing subscriber.
///
/// `json` switches to one JSON object per line for log shippers.
pub fn init_logging(json: bool) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter());

    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| LockstepError::UserError(format!("failed to initialize logging: {}", e)))
}
