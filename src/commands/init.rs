//! Implementation of the `lockstep init` command.
//!
//! Creates `locks/`, `batches/`, `tasks/` and `events/` under the store root
//! and writes a default `config.yaml` if none exists. Running it again on an
//! initialized store changes nothing.

use lockstep::config::Config;
use lockstep::context::StoreContext;
use lockstep::error::Result;
use lockstep::events::{Event, EventAction, append_event};
use lockstep::fs::atomic_write;
use serde_json::json;
use std::path::Path;

pub fn cmd_init(store: Option<&Path>) -> Result<()> {
    let ctx = StoreContext::resolve(store)?;
    let already = ctx.is_initialized();

    ctx.create_layout()?;

    let config_path = ctx.config_path();
    let wrote_config = if config_path.exists() {
        // Refuse to bless a config every worker would reject.
        Config::load(&config_path)?;
        false
    } else {
        atomic_write(&config_path, Config::default().to_yaml()?.as_bytes())?;
        true
    };

    if already && !wrote_config {
        println!("Store already initialized: {}", ctx.root.display());
        return Ok(());
    }

    append_event(
        &ctx,
        &Event::new(EventAction::Init).with_details(json!({
            "root": ctx.root.display().to_string(),
            "wrote_config": wrote_config,
        })),
    )?;

    println!("Initialized lockstep store.");
    println!();
    println!("Store:  {}", ctx.root.display());
    println!("Config: {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  lockstep submit noop --param '{{\"hello\": \"world\"}}'");
    println!("  lockstep work --until-idle");

    Ok(())
}
