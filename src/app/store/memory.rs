//! In-process content store

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::debug;

use crate::app::key::RemoteKey;
use crate::errors::CacheResult;

use super::stats::StoreStats;
use super::ContentStore;

/// Content store held entirely in memory
///
/// Nothing survives the process; useful for tests and for callers that only
/// want request coalescing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<RemoteKey, Bytes>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &RemoteKey, bytes: Bytes) -> CacheResult<()> {
        debug!("Storing {} bytes in memory for {}", bytes.len(), key);
        self.entries.write().await.insert(key.clone(), bytes);
        Ok(())
    }

    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> CacheResult<usize> {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        let entries = self.entries.read().await;
        let total_bytes = entries.values().map(|b| b.len() as u64).sum();
        StoreStats::new(None, entries.len(), total_bytes)
    }
}
