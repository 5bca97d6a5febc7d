//! Filesystem content store with atomic writes
//!
//! Payloads are written to a unique temp file next to their final location
//! and renamed into place, so readers only ever see complete entries.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::app::key::RemoteKey;
use crate::constants::store;
use crate::errors::{CacheError, CacheResult};

use super::config::StoreConfig;
use super::path::PathGenerator;
use super::stats::{DirectoryScanner, StoreStats};
use super::ContentStore;

/// Content store persisting entries under a root directory
#[derive(Debug)]
pub struct DiskStore {
    config: StoreConfig,
    root: PathBuf,
}

impl DiskStore {
    /// Create a disk store, creating its root directory if needed
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the root directory cannot be created
    pub async fn new(config: StoreConfig) -> CacheResult<Self> {
        let root = match &config.cache_root {
            Some(path) => path.clone(),
            None => Self::default_root()?,
        };

        Self::ensure_directory_exists(&root).await?;

        info!("Initialized disk store with root: {}", root.display());

        Ok(Self { config, root })
    }

    /// Get the store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the store configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the entry for `key`
    pub fn entry_path(&self, key: &RemoteKey) -> PathBuf {
        PathGenerator::entry_path(&self.root, key)
    }

    /// Default store root for the current OS
    ///
    /// - macOS: ~/Library/Caches/remote-data/cache
    /// - Linux: ~/.cache/remote-data/cache
    /// - Windows: %LOCALAPPDATA%/remote-data/cache
    pub fn default_root() -> CacheResult<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| CacheError::DirectoryNotAccessible {
                path: PathBuf::from("system cache directory"),
            })?
            .join(store::APP_DIR_NAME)
            .join(store::STORE_DIR_NAME);

        Ok(cache_dir)
    }

    async fn ensure_directory_exists(path: &Path) -> CacheResult<()> {
        if fs::metadata(path).await.is_err() {
            fs::create_dir_all(path).await.map_err(|e| {
                error!("Failed to create store directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: path.to_path_buf(),
                }
            })?;
            debug!("Created store directory: {}", path.display());
        }
        Ok(())
    }

    async fn write_temp(&self, temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(temp_path).await?;
        file.write_all(bytes).await?;
        if self.config.sync_writes {
            file.sync_all().await?;
        }
        file.flush().await
    }
}

#[async_trait]
impl ContentStore for DiskStore {
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool> {
        match fs::metadata(self.entry_path(key)).await {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>> {
        match fs::read(self.entry_path(key)).await {
            Ok(content) => Ok(Some(Bytes::from(content))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::Read {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn put(&self, key: &RemoteKey, bytes: Bytes) -> CacheResult<()> {
        let final_path = self.entry_path(key);
        let temp_path = PathGenerator::temp_path(&final_path);
        let persist_error = |reason: String| CacheError::Persist {
            key: key.to_string(),
            reason,
        };

        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| persist_error(format!("Directory creation failed: {}", e)))?;
        }

        if let Err(e) = self.write_temp(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(persist_error(format!("Temporary file write failed: {}", e)));
        }

        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(persist_error(format!("Atomic rename failed: {}", e)));
        }

        debug!(
            "Stored {} bytes for {} at {}",
            bytes.len(),
            key,
            final_path.display()
        );
        Ok(())
    }

    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {
                debug!("Removed store entry: {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::Remove {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn clear(&self) -> CacheResult<usize> {
        let mut removed = 0;
        for path in DirectoryScanner::list_entries(&self.root).await {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        info!("Cleared {} entries from {}", removed, self.root.display());
        Ok(removed)
    }

    async fn stats(&self) -> StoreStats {
        let (entry_count, total_bytes) = DirectoryScanner::scan(&self.root).await;
        StoreStats::new(Some(self.root.clone()), entry_count, total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key(raw: &str) -> RemoteKey {
        RemoteKey::new(raw).unwrap()
    }

    async fn create_store() -> (TempDir, DiskStore) {
        let temp_dir = TempDir::new().unwrap();
        let config = StoreConfig::with_cache_root(temp_dir.path().join("store"));
        let store = DiskStore::new(config).await.unwrap();
        (temp_dir, store)
    }

    #[tokio::test]
    async fn test_store_creation_creates_root() {
        let (temp_dir, store) = create_store().await;
        assert_eq!(store.root(), temp_dir.path().join("store"));
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_temp_dir, store) = create_store().await;
        let k = key("images/a.jpg");

        assert!(!store.has(&k).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), None);

        store.put(&k, Bytes::from_static(b"jpeg")).await.unwrap();

        assert!(store.has(&k).await.unwrap());
        assert_eq!(store.get(&k).await.unwrap(), Some(Bytes::from_static(b"jpeg")));
        assert!(store.entry_path(&k).is_file());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_files() {
        let (_temp_dir, store) = create_store().await;
        let k = key("a.jpg");

        store.put(&k, Bytes::from_static(b"first")).await.unwrap();
        store.put(&k, Bytes::from_static(b"second")).await.unwrap();

        assert_eq!(store.get(&k).await.unwrap(), Some(Bytes::from_static(b"second")));

        let shard = store.entry_path(&k).parent().unwrap().to_path_buf();
        let names: Vec<_> = std::fs::read_dir(shard)
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_writes() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            StoreConfig::with_cache_root(temp_dir.path().to_path_buf()).with_sync_writes(true);
        let store = DiskStore::new(config).await.unwrap();

        store.put(&key("s"), Bytes::from_static(b"x")).await.unwrap();
        assert!(store.has(&key("s")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_temp_dir, store) = create_store().await;
        let k = key("b.jpg");

        store.put(&k, Bytes::from_static(b"b")).await.unwrap();
        assert!(store.remove(&k).await.unwrap());
        assert!(!store.remove(&k).await.unwrap());
        assert!(!store.has(&k).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_and_stats() {
        let (_temp_dir, store) = create_store().await;

        store.put(&key("a"), Bytes::from_static(b"12")).await.unwrap();
        store.put(&key("b"), Bytes::from_static(b"345")).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_bytes, 5);
        assert_eq!(stats.root.as_deref(), Some(store.root()));

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.stats().await.entry_count, 0);
    }

    #[tokio::test]
    async fn test_put_failure_reports_persist_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::new(StoreConfig::with_cache_root(temp_dir.path().to_path_buf()))
            .await
            .unwrap();
        let k = key("blocked");

        // A plain file where the shard directory should be
        let shard = store.entry_path(&k).parent().unwrap().to_path_buf();
        std::fs::write(&shard, b"not a directory").unwrap();

        let err = store.put(&k, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, CacheError::Persist { .. }));
    }
}
