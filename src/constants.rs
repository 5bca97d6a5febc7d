//! Application constants for Remote Data
//!
//! This module centralizes all constants used throughout the crate,
//! organized by functional domain.

use std::time::Duration;

/// Environment variable names
pub mod env {
    /// Overrides the remote base URL
    pub const BASE_URL: &str = "REMOTE_DATA_BASE_URL";

    /// Overrides the store root directory
    pub const CACHE_DIR: &str = "REMOTE_DATA_CACHE_DIR";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = concat!("remote-data/", env!("CARGO_PKG_VERSION"));

    /// Default base URL that keys are resolved against
    pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// TCP keep-alive interval
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 8;

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;
}

/// Rate limiting and retry configuration for the HTTP transport
pub mod limits {
    /// Default rate limit (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 15;

    /// Maximum retry attempts for 429/503/connection failures
    pub const MAX_RETRIES: u32 = 3;

    /// Largest `max_retries` accepted from configuration
    pub const MAX_RETRIES_LIMIT: u32 = 10;

    /// Base delay for exponential backoff (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 250;

    /// Ceiling for a single backoff delay (milliseconds)
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    /// Upper bound on rate limiter jitter (milliseconds)
    pub const JITTER_MAX_MS: u64 = 100;
}

/// Content store layout
pub mod store {
    /// Application directory name under the OS config/cache directory
    pub const APP_DIR_NAME: &str = "remote-data";

    /// Store directory name inside the application directory
    pub const STORE_DIR_NAME: &str = "cache";

    /// Suffix for in-progress writes
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Extension of stored payload files
    pub const ENTRY_EXTENSION: &str = "bin";
}

/// Configuration file locations
pub mod config {
    /// Project-local configuration file name
    pub const LOCAL_CONFIG_FILE: &str = "remote-data.toml";

    /// Configuration file name inside the user config directory
    pub const USER_CONFIG_FILE: &str = "config.toml";
}
