//! Configuration management for Remote Data
//!
//! This module provides unified configuration management with automatic
//! first-run initialization, multi-source loading, and zero-config defaults.
//!
//! Precedence, lowest to highest:
//! 1. Default values
//! 2. Config file (explicit path, `./remote-data.toml`, or the user config dir)
//! 3. Environment variables (`REMOTE_DATA_BASE_URL`, `REMOTE_DATA_CACHE_DIR`)
//! 4. CLI arguments, applied by the binary

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::{ClientConfig, CoordinatorConfig, StoreConfig};
use crate::constants::{config, env, http, limits, store};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Content store settings
    pub store: StoreConfigToml,
    /// HTTP transport settings
    pub client: ClientConfigToml,
    /// Fetch coordinator settings
    pub coordinator: CoordinatorConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfigToml {
    /// Store directory path
    pub cache_root: Option<PathBuf>,
    /// Flush payloads to disk before the atomic rename
    pub sync_writes: bool,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Base URL that keys are resolved against
    pub base_url: String,
    /// Enable HTTP/2 support
    pub http2: bool,
    /// TCP keep-alive timeout in seconds (None = disabled)
    pub tcp_keepalive_secs: Option<u64>,
    /// TCP nodelay setting
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout in seconds (None = no timeout)
    pub pool_idle_timeout_secs: Option<u64>,
    /// Maximum connections per host
    pub pool_max_per_host: usize,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries for 429/503/connection failures
    pub max_retries: u32,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: http::DEFAULT_BASE_URL.to_string(),
            http2: false,
            tcp_keepalive_secs: Some(http::TCP_KEEPALIVE.as_secs()),
            tcp_nodelay: true,
            pool_idle_timeout_secs: Some(http::POOL_IDLE_TIMEOUT.as_secs()),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout_secs: http::DEFAULT_TIMEOUT.as_secs(),
            connect_timeout_secs: http::CONNECT_TIMEOUT.as_secs(),
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
        }
    }
}

/// TOML-friendly coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfigToml {
    /// Write fetched payloads to the store
    pub persist_results: bool,
    /// Warn about fetches slower than this many seconds (0 = never)
    pub slow_fetch_threshold_secs: u64,
}

impl Default for CoordinatorConfigToml {
    fn default() -> Self {
        Self {
            persist_results: true,
            slow_fetch_threshold_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            colored_output: true,
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (StoreConfig, ClientConfig, CoordinatorConfig) {
        (
            self.store.to_runtime_config(),
            self.client.to_runtime_config(),
            self.coordinator.to_runtime_config(),
        )
    }

    /// Load configuration from file and environment
    ///
    /// With `config_file_override`, that file must exist. Otherwise the
    /// standard locations are searched and defaults are used if none exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or holds invalid values
    pub async fn load(config_file_override: Option<PathBuf>) -> ConfigResult<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        let mut config = match config_path {
            Some(path) => Self::load_from_file(&path).await?,
            None => {
                debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup, normally the process
    /// environment
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(env::BASE_URL).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides base URL: {}", env::BASE_URL, base_url);
            self.client.base_url = base_url;
        }
        if let Some(cache_dir) = lookup(env::CACHE_DIR).filter(|v| !v.trim().is_empty()) {
            debug!("{} overrides cache root: {}", env::CACHE_DIR, cache_dir);
            self.store.cache_root = Some(PathBuf::from(cache_dir));
        }
    }

    /// Check values that would otherwise fail later at runtime
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first bad field
    pub fn validate(&self) -> ConfigResult<()> {
        if let Err(e) = Url::parse(&self.client.base_url) {
            return Err(ConfigError::InvalidValue {
                field: "client.base_url".to_string(),
                value: self.client.base_url.clone(),
                reason: e.to_string(),
            });
        }
        if self.client.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.rate_limit_rps".to_string(),
                value: "0".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }
        if self.client.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }
        if self.client.max_retries > limits::MAX_RETRIES_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "client.max_retries".to_string(),
                value: self.client.max_retries.to_string(),
                reason: format!("Must be at most {}", limits::MAX_RETRIES_LIMIT),
            });
        }
        Ok(())
    }

    /// Initialize configuration on first run
    ///
    /// Creates a default config file in the user config directory if none
    /// exists and notifies the user
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the config directory is unknown or the file
    /// cannot be written
    pub async fn initialize_first_run() -> ConfigResult<Option<PathBuf>> {
        let config_path = Self::default_config_path()?;
        Self::initialize_at(&config_path).await?;
        Ok(Some(config_path))
    }

    /// Write the default config file to `config_path` unless it exists
    ///
    /// Returns whether a file was created.
    pub async fn initialize_at(config_path: &Path) -> ConfigResult<bool> {
        if config_path.exists() {
            return Ok(false);
        }

        info!("Creating default configuration file...");

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::Io {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }

        tokio::fs::write(config_path, Self::generate_default_config_content())
            .await
            .map_err(|e| ConfigError::Io {
                path: config_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        println!("Created default configuration file:");
        println!("   {}", config_path.display());
        println!("   You can customize settings by editing this file.");
        println!();

        Ok(true)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(format!("./{}", config::LOCAL_CONFIG_FILE))];
        if let Ok(user_path) = Self::default_config_path() {
            search_paths.push(user_path);
        }

        search_paths.into_iter().find(|path| {
            let found = path.exists();
            if found {
                debug!("Found config file: {}", path.display());
            }
            found
        })
    }

    /// Get the default config file path for the current user
    pub fn default_config_path() -> ConfigResult<PathBuf> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir
            .join(store::APP_DIR_NAME)
            .join(config::USER_CONFIG_FILE))
    }

    /// Load configuration from a TOML file
    async fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let config: AppConfig = toml::from_str(&content)?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Generate default configuration content with helpful comments
    fn generate_default_config_content() -> String {
        let default_cache_path = dirs::cache_dir()
            .map(|dir| dir.join(store::APP_DIR_NAME).join(store::STORE_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!("./{}", store::STORE_DIR_NAME)));

        format!(
            r#"# Remote Data Configuration
# This file was automatically generated on first run.
# You can customize any of these settings to suit your needs.

[store]
# Store directory (leave unset to use the system default)
# Default: {}
# cache_root = "/path/to/custom/cache"

# Flush payloads to disk before they become visible
sync_writes = false

[client]
# Keys are resolved against this URL
base_url = "{}"
http2 = false
tcp_keepalive_secs = {}
tcp_nodelay = true
pool_idle_timeout_secs = {}
pool_max_per_host = {}
request_timeout_secs = {}
connect_timeout_secs = {}
rate_limit_rps = {}
max_retries = {}

[coordinator]
# Write fetched payloads to the store
persist_results = true
# Warn about fetches slower than this (seconds, 0 = never)
slow_fetch_threshold_secs = 10

[logging]
level = "info"  # error, warn, info, debug, trace
colored_output = true
"#,
            default_cache_path.display(),
            http::DEFAULT_BASE_URL,
            http::TCP_KEEPALIVE.as_secs(),
            http::POOL_IDLE_TIMEOUT.as_secs(),
            http::POOL_MAX_PER_HOST,
            http::DEFAULT_TIMEOUT.as_secs(),
            http::CONNECT_TIMEOUT.as_secs(),
            limits::DEFAULT_RATE_LIMIT_RPS,
            limits::MAX_RETRIES,
        )
    }
}

impl StoreConfigToml {
    /// Convert to runtime StoreConfig
    pub fn to_runtime_config(&self) -> StoreConfig {
        StoreConfig {
            cache_root: self.cache_root.clone(),
            sync_writes: self.sync_writes,
        }
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            http2: self.http2,
            tcp_keepalive: self.tcp_keepalive_secs.map(Duration::from_secs),
            tcp_nodelay: self.tcp_nodelay,
            pool_idle_timeout: self.pool_idle_timeout_secs.map(Duration::from_secs),
            pool_max_per_host: self.pool_max_per_host,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            rate_limit_rps: self.rate_limit_rps,
            max_retries: self.max_retries,
        }
    }
}

impl CoordinatorConfigToml {
    /// Convert to runtime CoordinatorConfig
    pub fn to_runtime_config(&self) -> CoordinatorConfig {
        let threshold = match self.slow_fetch_threshold_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        CoordinatorConfig::default()
            .with_persist_results(self.persist_results)
            .with_slow_fetch_threshold(threshold)
    }
}
