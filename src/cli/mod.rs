//! Command-line interface components
//!
//! This module contains CLI-specific code for the Remote Data application:
//! argument parsing and the command handlers.

pub mod args;
pub mod commands;

pub use args::{CacheAction, CacheArgs, Cli, Commands, FetchArgs, GlobalArgs};
pub use commands::{build_coordinator, handle_cache, handle_fetch};
