//! Configuration for the fetch coordinator

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the fetch coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Write successful payloads to the content store
    pub persist_results: bool,
    /// Log a warning for fetches slower than this
    pub slow_fetch_threshold: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            persist_results: true,
            slow_fetch_threshold: Some(Duration::from_secs(10)),
        }
    }
}

impl CoordinatorConfig {
    /// Enable or disable writing payloads to the store
    pub fn with_persist_results(mut self, enabled: bool) -> Self {
        self.persist_results = enabled;
        self
    }

    /// Set the slow fetch warning threshold
    pub fn with_slow_fetch_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_fetch_threshold = threshold;
        self
    }
}
