//! Error types for Remote Data
//!
//! This module defines the error taxonomy for every component of the crate.
//! Fetch-path errors never escape the coordinator as faults: they are turned
//! into a terminal failed outcome and delivered to waiters and observers.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Key normalization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Key was empty after trimming
    #[error("Remote key is empty")]
    Empty,
}

/// Content store errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Store directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// Lookup of a key failed; the coordinator treats this as a miss
    #[error("Cache read failed for {key}: {reason}")]
    Read { key: String, reason: String },

    /// Writing a fetched payload failed; delivery to waiters is unaffected
    #[error("Cache persist failed for {key}: {reason}")]
    Persist { key: String, reason: String },

    /// Removing an entry failed
    #[error("Cache remove failed for {key}: {reason}")]
    Remove { key: String, reason: String },

    /// Generic I/O error
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),
}

/// Transport (remote fetch) errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Request timed out
    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// Invalid URL built from the key
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Server returned a non-success status
    #[error("Server error: HTTP {status}")]
    ServerError { status: u16 },

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Server responded with HTTP 429")]
    RateLimitExceeded,

    /// Server overloaded
    #[error("Server overloaded. Server responded with HTTP 503")]
    ServerOverloaded,

    /// Maximum retries exceeded
    #[error("Maximum retry attempts ({max_retries}) exceeded for fetch")]
    MaxRetriesExceeded { max_retries: u32 },

    /// Response body could not be read
    #[error("Failed to read response body: {reason}")]
    Body { reason: String },

    /// Transport-specific failure
    #[error("{0}")]
    Other(String),
}

/// Shared failure delivered to every waiter and observer of one fetch
pub type FetchError = Arc<TransportError>;

/// Errors raised by an observer while handling an event
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// Observer reported a failure of its own
    #[error("Observer failed: {0}")]
    Failed(String),

    /// Observer callback panicked
    #[error("Observer panicked: {0}")]
    Panicked(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read or written
    #[error("Configuration file I/O error for {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// User configuration directory could not be determined
    #[error("Could not determine user config directory")]
    NoConfigDir,
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Key error
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Cache error
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Failure shared by the waiters of one fetch
    #[error(transparent)]
    Fetch(FetchError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl From<FetchError> for AppError {
    fn from(error: FetchError) -> Self {
        AppError::Fetch(error)
    }
}

impl TransportError {
    /// Check if the error is transient and a new request may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Http(_)
                | TransportError::Timeout { .. }
                | TransportError::RateLimitExceeded
                | TransportError::ServerOverloaded
                | TransportError::MaxRetriesExceeded { .. }
        )
    }
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transport(e) => e.is_recoverable(),
            AppError::Fetch(e) => e.is_recoverable(),
            AppError::Key(_) | AppError::Config(_) => false,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Key(_) => "key",
            AppError::Cache(_) => "cache",
            AppError::Transport(_) | AppError::Fetch(_) => "transport",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Config result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
