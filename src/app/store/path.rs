//! Entry path generation
//!
//! Keys are arbitrary remote paths, so they are never used as file names
//! directly. Each key maps to the MD5 digest of its normalized form, sharded
//! by the first two hex characters:
//! `{root}/{digest[0..2]}/{digest}.bin`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::app::key::RemoteKey;
use crate::constants::store;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Path generation utility for stored entries
pub struct PathGenerator;

impl PathGenerator {
    /// Final location of the payload for `key`
    pub fn entry_path(root: &Path, key: &RemoteKey) -> PathBuf {
        let digest = key.digest_hex();
        root.join(&digest[..2])
            .join(format!("{}.{}", digest, store::ENTRY_EXTENSION))
    }

    /// Unique sibling of `final_path` used for the write-then-rename step
    ///
    /// Concurrent writers of the same key each get their own temp file, so a
    /// rename always moves a complete payload.
    pub fn temp_path(final_path: &Path) -> PathBuf {
        let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut name = final_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(
            ".{}-{}{}",
            std::process::id(),
            sequence,
            store::TEMP_FILE_SUFFIX
        ));
        final_path.with_file_name(name)
    }

    /// Whether `path` names a completed entry
    pub fn is_entry_file(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext == store::ENTRY_EXTENSION)
            .unwrap_or(false)
    }
}
