//! Configuration model for lockstep.
//!
//! This module defines the Config struct that represents `{store}/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for optional fields, and validation of config values.
//!
//! Every worker sharing a store reads the same file, so lock timing and the
//! attempt ceiling agree across processes.

mod model;
mod operations;
pub mod types;


pub use model::Config;
