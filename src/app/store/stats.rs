//! Store statistics and directory scanning

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use super::path::PathGenerator;

/// Content store statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    /// Store root directory (None for in-memory stores)
    pub root: Option<PathBuf>,
    /// Number of stored entries
    pub entry_count: usize,
    /// Total size of stored payloads in bytes
    pub total_bytes: u64,
}

impl StoreStats {
    /// Create statistics for a store
    pub fn new(root: Option<PathBuf>, entry_count: usize, total_bytes: u64) -> Self {
        Self {
            root,
            entry_count,
            total_bytes,
        }
    }

    /// Format total size in human-readable format
    pub fn format_total_size(&self) -> String {
        format_bytes(self.total_bytes)
    }
}

/// Directory scanner for on-disk stores
pub struct DirectoryScanner;

impl DirectoryScanner {
    /// Count entry files and their total size under `root`
    pub async fn scan(root: &Path) -> (usize, u64) {
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || Self::scan_directory_recursive(&root))
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to scan store directory: {}", e);
                (0, 0)
            })
    }

    /// Entry files under `root`, for bulk removal
    pub async fn list_entries(root: &Path) -> Vec<PathBuf> {
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let mut found = Vec::new();
            Self::collect_entries(&root, &mut found);
            found
        })
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to list store entries: {}", e);
            Vec::new()
        })
    }

    fn scan_directory_recursive(dir: &Path) -> (usize, u64) {
        let mut file_count = 0;
        let mut total_size = 0u64;

        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();

                if path.is_dir() {
                    let (sub_count, sub_size) = Self::scan_directory_recursive(&path);
                    file_count += sub_count;
                    total_size += sub_size;
                } else if path.is_file() && PathGenerator::is_entry_file(&path) {
                    file_count += 1;
                    if let Ok(metadata) = entry.metadata() {
                        total_size += metadata.len();
                    }
                }
            }
        }

        (file_count, total_size)
    }

    fn collect_entries(dir: &Path, found: &mut Vec<PathBuf>) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    Self::collect_entries(&path, found);
                } else if PathGenerator::is_entry_file(&path) {
                    found.push(path);
                }
            }
        }
    }
}

/// Format bytes in human-readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: u64 = 1024;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD as f64 && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD as f64;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}
