//! Remote Data CLI application
//!
//! Command-line interface for fetching remote resources through the
//! single-flight local cache.

use std::process;

use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

// Import CLI modules through the library (module is public but not re-exported)
use remote_data::cli::{handle_cache, handle_fetch, Cli, Commands};
use remote_data::config::AppConfig;
use remote_data::errors::{AppError, Result};

#[tokio::main]
async fn main() {
    // Initialize program
    let result = run().await;

    // Handle any errors that occurred
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok(); // Ignore errors if file doesn't exist

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Write a default config file on first run, unless one was given
    let first_run = if cli.global.config.is_none() {
        AppConfig::initialize_first_run().await
    } else {
        Ok(None)
    };

    let mut config = AppConfig::load(cli.global.config.clone()).await?;
    cli.global.apply_to(&mut config);
    config.validate()?;

    // Initialize logging based on verbosity and configuration
    init_logging(&cli, &config)?;

    info!("Remote Data v{} starting", env!("CARGO_PKG_VERSION"));
    if let Err(e) = first_run {
        warn!("Could not create default configuration file: {}", e);
    }

    // Execute the appropriate command
    match cli.command {
        Commands::Fetch(args) => {
            info!("Executing fetch command");
            handle_fetch(args, &config).await
        }
        Commands::Cache(args) => {
            info!("Executing cache command");
            handle_cache(args, &config).await
        }
    }
}

/// Initialize logging based on CLI verbosity settings and configuration
fn init_logging(cli: &Cli, config: &AppConfig) -> Result<()> {
    let log_level = cli.log_level(&config.logging.level);

    // Create environment filter
    let directive = format!("remote_data={}", log_level)
        .parse::<Directive>()
        .map_err(|e| AppError::generic(format!("Invalid log level '{}': {}", log_level, e)))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    // Initialize subscriber
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.logging.colored_output)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}
