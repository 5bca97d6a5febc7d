//! Command-line argument parsing for Remote Data
//!
//! This module defines the CLI structure using clap derive macros,
//! providing a user-friendly interface for fetching remote resources through
//! the single-flight cache and managing the local store.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

/// Remote Data - Fetch remote resources through a local cache
#[derive(Parser, Debug)]
#[command(
    name = "remote_data",
    version,
    about = "Fetch remote resources through a single-flight local cache",
    long_about = "Fetches remote resources by key, answering from the local content store when possible.
Concurrent requests for the same key share one network fetch."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (debug level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Cache directory path
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL that keys are resolved against
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one or more keys
    Fetch(FetchArgs),

    /// Local content store management
    Cache(CacheArgs),
}

/// Arguments for the fetch command
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Keys to fetch; repeated keys share a single fetch
    #[arg(value_name = "KEY", required = true)]
    pub keys: Vec<String>,

    /// Write each payload under this directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Do not write fetched payloads to the store
    #[arg(long)]
    pub no_store: bool,
}

/// Arguments for cache management
#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache management actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show store location, entry count and size
    Info {
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every stored entry
    Clear,

    /// Remove the entry for one key
    Remove {
        /// Key to remove
        #[arg(value_name = "KEY")]
        key: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the logging level, falling back to the configured one when no
    /// verbosity flag is given
    pub fn log_level(&self, configured: &str) -> String {
        if self.global.quiet {
            tracing::Level::ERROR.to_string()
        } else if self.global.very_verbose {
            tracing::Level::DEBUG.to_string()
        } else if self.global.verbose {
            tracing::Level::INFO.to_string()
        } else {
            configured.to_string()
        }
    }
}

impl GlobalArgs {
    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(cache_dir) = &self.cache_dir {
            config.store.cache_root = Some(cache_dir.clone());
        }
        if let Some(base_url) = &self.base_url {
            config.client.base_url = base_url.clone();
        }
    }
}

impl FetchArgs {
    /// Reject blank keys before any work starts
    pub fn validate(&self) -> Result<(), String> {
        if let Some(position) = self.keys.iter().position(|key| key.trim().is_empty()) {
            return Err(format!("Key #{} is empty", position + 1));
        }
        Ok(())
    }
}
