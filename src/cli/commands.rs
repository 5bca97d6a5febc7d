//! Command handlers for Remote Data CLI
//!
//! This module implements the command handlers that connect CLI arguments
//! to the store, transport and coordinator.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::app::{
    ContentStore, DiskStore, FetchCoordinator, FetchEvent, HttpTransport, RemoteKey,
    RequestOutcome,
};
use crate::cli::{CacheAction, CacheArgs, FetchArgs};
use crate::config::AppConfig;
use crate::errors::{AppError, ObserverError, Result};

/// Outcome of one key on the command line
#[derive(Debug)]
pub enum KeyReport {
    /// Answered from the store
    Cached(Bytes),
    /// Fetched over the network
    Fetched(Bytes),
    /// Invalid key or failed fetch
    Failed(String),
}

impl KeyReport {
    /// Payload, if any
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            KeyReport::Cached(bytes) | KeyReport::Fetched(bytes) => Some(bytes),
            KeyReport::Failed(_) => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            KeyReport::Cached(_) => "cached",
            KeyReport::Fetched(_) => "fetched",
            KeyReport::Failed(_) => "failed",
        }
    }
}

/// Build the disk store, HTTP transport and coordinator from configuration
///
/// # Errors
///
/// Returns `AppError` if the store directory or HTTP client cannot be set up
pub async fn build_coordinator(config: &AppConfig) -> Result<(FetchCoordinator, Arc<DiskStore>)> {
    let (store_config, client_config, coordinator_config) = config.to_runtime_config();

    let store = Arc::new(DiskStore::new(store_config).await?);
    let transport = Arc::new(HttpTransport::with_config(client_config)?);
    let coordinator =
        FetchCoordinator::with_current_runtime(coordinator_config, store.clone(), transport)?;

    Ok((coordinator, store))
}

/// Handle the fetch command
///
/// Requests every key concurrently through one coordinator, so repeated
/// keys share a single network fetch.
pub async fn handle_fetch(args: FetchArgs, config: &AppConfig) -> Result<()> {
    let start_time = Instant::now();
    args.validate().map_err(AppError::generic)?;

    let mut config = config.clone();
    if args.no_store {
        config.coordinator.persist_results = false;
    }
    let (coordinator, store) = build_coordinator(&config).await?;
    info!(
        "Fetching {} key(s) using store at {}",
        args.keys.len(),
        store.root().display()
    );

    coordinator.add_observer(|event: &FetchEvent| -> std::result::Result<(), ObserverError> {
        match event.error() {
            None => debug!("Completed fetch for {}", event.key),
            Some(e) => debug!("Failed fetch for {}: {}", event.key, e),
        }
        Ok(())
    });

    let reports = join_all(args.keys.iter().map(|key| fetch_one(&coordinator, key))).await;

    let mut failed = 0;
    for (key, report) in &reports {
        match report {
            KeyReport::Failed(reason) => {
                failed += 1;
                println!("{:<8} {}  {}", report.label(), key, reason);
            }
            _ => {
                let bytes = report.bytes().map(Bytes::len).unwrap_or(0);
                println!("{:<8} {}  {} bytes", report.label(), key, bytes);
            }
        }
    }

    if let Some(output_dir) = &args.output {
        for (key, report) in &reports {
            if let (Some(bytes), Ok(key)) = (report.bytes(), RemoteKey::new(key)) {
                let path = output_path(output_dir, &key);
                write_output(&path, bytes).await?;
                debug!("Wrote {} to {}", key, path.display());
            }
        }
    }

    let stats = coordinator.stats();
    println!();
    println!("Requests: {}", stats.requests);
    println!(
        "Cache hits: {} ({:.1}%)",
        stats.cache_hits,
        stats.hit_rate()
    );
    println!(
        "Network fetches: {} ({} request(s) joined a fetch in flight)",
        stats.fetches_started, stats.joined_waiters
    );
    if stats.persist_failures > 0 {
        println!("Store write failures: {}", stats.persist_failures);
    }
    println!("Total time: {:.2}s", start_time.elapsed().as_secs_f64());

    if failed > 0 {
        return Err(AppError::generic(format!(
            "{} of {} key(s) failed",
            failed,
            reports.len()
        )));
    }
    Ok(())
}

async fn fetch_one(coordinator: &FetchCoordinator, raw: &str) -> (String, KeyReport) {
    let report = match coordinator.request(raw).await {
        Err(e) => KeyReport::Failed(e.to_string()),
        Ok(RequestOutcome::Cached(bytes)) => KeyReport::Cached(bytes),
        Ok(RequestOutcome::Pending(subscription)) => match subscription.await {
            Ok(bytes) => KeyReport::Fetched(bytes),
            Err(e) => KeyReport::Failed(e.to_string()),
        },
    };
    (raw.trim().to_string(), report)
}

/// Destination of a payload under `output_dir`
///
/// Only normal path components of the key are kept, so keys cannot escape
/// the output directory.
pub fn output_path(output_dir: &Path, key: &RemoteKey) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for component in Path::new(key.relative_path()).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    if path == output_dir {
        path.push(key.digest_hex());
    }
    path
}

async fn write_output(path: &Path, bytes: &Bytes) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Handle cache management commands
pub async fn handle_cache(args: CacheArgs, config: &AppConfig) -> Result<()> {
    let store = DiskStore::new(config.store.to_runtime_config()).await?;

    match args.action {
        CacheAction::Info { json } => handle_cache_info(&store, json).await,
        CacheAction::Clear => handle_cache_clear(&store).await,
        CacheAction::Remove { key } => handle_cache_remove(&store, &key).await,
    }
}

async fn handle_cache_info(store: &DiskStore, json: bool) -> Result<()> {
    let stats = store.stats().await;

    if json {
        let rendered = serde_json::to_string_pretty(&stats)
            .map_err(|e| AppError::generic(format!("Failed to render statistics: {}", e)))?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("Cache Information");
    println!("=================");
    println!("Location: {}", store.root().display());
    println!("Stored entries: {}", stats.entry_count);
    println!("Cache size: {}", stats.format_total_size());

    Ok(())
}

async fn handle_cache_clear(store: &DiskStore) -> Result<()> {
    let removed = store.clear().await?;
    info!("Cleared {} entries from {}", removed, store.root().display());
    println!("Removed {} stored entries", removed);
    Ok(())
}

async fn handle_cache_remove(store: &DiskStore, raw: &str) -> Result<()> {
    let key = RemoteKey::new(raw)?;
    if store.remove(&key).await? {
        println!("Removed {}", key);
    } else {
        warn!("No stored entry for {}", key);
        println!("{} was not cached", key);
    }
    Ok(())
}
