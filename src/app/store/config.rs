//! Content store configuration types and defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the on-disk content store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for stored payloads (OS-specific if None)
    pub cache_root: Option<PathBuf>,
    /// Flush payloads to disk before the atomic rename
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_root: None, // Will use OS-specific directory
            sync_writes: false,
        }
    }
}

impl StoreConfig {
    /// Create a new store configuration with a custom root
    pub fn with_cache_root(cache_root: PathBuf) -> Self {
        Self {
            cache_root: Some(cache_root),
            ..Default::default()
        }
    }

    /// Enable or disable flushing before rename
    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }
}
