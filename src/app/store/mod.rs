//! Local content store
//!
//! The coordinator only ever talks to a [`ContentStore`]: a durable
//! key → bytes map with an existence check. Eviction is the store's own
//! business.
//!
//! - [`config`] - Configuration types and defaults
//! - [`path`] - Entry path generation for the disk store
//! - [`stats`] - Store statistics and directory scanning
//! - [`disk`] - Filesystem store with atomic writes
//! - [`memory`] - In-process store
//!
//! # Examples
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use remote_data::app::store::{ContentStore, DiskStore, StoreConfig};
//! use remote_data::app::RemoteKey;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = DiskStore::new(StoreConfig::default()).await?;
//! let key = RemoteKey::new("images/a.jpg")?;
//!
//! store.put(&key, Bytes::from_static(b"jpeg bytes")).await?;
//! assert!(store.has(&key).await?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk;
pub mod memory;
pub mod path;
pub mod stats;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::app::key::RemoteKey;
use crate::errors::CacheResult;

pub use config::StoreConfig;
pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use path::PathGenerator;
pub use stats::{DirectoryScanner, StoreStats};

/// Durable key → bytes store backing the fetch coordinator
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// Whether an entry exists for `key`
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool>;

    /// Read the entry for `key`; `Ok(None)` when absent
    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>>;

    /// Write (or overwrite) the entry for `key`
    async fn put(&self, key: &RemoteKey, bytes: Bytes) -> CacheResult<()>;

    /// Remove the entry for `key`, returning whether one existed
    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool>;

    /// Remove every entry, returning how many were removed
    async fn clear(&self) -> CacheResult<usize>;

    /// Current entry count and size
    async fn stats(&self) -> StoreStats;
}
