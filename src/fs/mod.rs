//! Filesystem utilities for lockstep.
//!
//! Every record in the shared store is replaced through [`atomic_write`], so
//! lock-free readers never observe a partially written document.

pub mod atomic;

pub use atomic::{atomic_write, is_temp_file};
