//! Single-flight fetch coordination
//!
//! The [`FetchCoordinator`] answers requests for remote resources from the
//! content store when it can. On a miss it makes sure exactly one transport
//! fetch is outstanding per key, however many callers ask: the first caller
//! starts the fetch, later callers attach to it as waiters. When the fetch
//! finishes the payload is written to the store, every waiter receives the
//! same outcome, and the outcome is broadcast to all observers.
//!
//! # Architecture
//!
//! - [`config`] - Coordinator configuration
//! - [`events`] - Typed fetch events and results
//! - [`inflight`] - In-flight request table entries and waiters
//! - [`observers`] - Observer registry and broadcast
//! - [`stats`] - Request and fetch counters
//! - [`subscription`] - Request outcomes and pending-fetch futures
//!
//! # Execution context
//!
//! Transport fetches run on tasks spawned onto the tokio runtime handle the
//! coordinator was created with. Completion callbacks and observer
//! broadcasts run on that same task, never on the requesting caller's task.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use remote_data::app::{
//!     ClientConfig, CoordinatorConfig, DiskStore, FetchCoordinator, FetchEvent, HttpTransport,
//!     RequestOutcome, StoreConfig,
//! };
//! use remote_data::errors::ObserverError;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DiskStore::new(StoreConfig::default()).await?);
//! let transport = Arc::new(HttpTransport::with_config(ClientConfig::with_base_url(
//!     "https://cdn.example.com/",
//! ))?);
//! let coordinator = FetchCoordinator::new(
//!     CoordinatorConfig::default(),
//!     store,
//!     transport,
//!     tokio::runtime::Handle::current(),
//! );
//!
//! coordinator.add_observer(|event: &FetchEvent| -> Result<(), ObserverError> {
//!     println!("{} finished, success: {}", event.key, event.is_success());
//!     Ok(())
//! });
//!
//! match coordinator.request("images/a.jpg").await? {
//!     RequestOutcome::Cached(bytes) => println!("cached: {} bytes", bytes.len()),
//!     RequestOutcome::Pending(subscription) => {
//!         let bytes = subscription.await?;
//!         println!("fetched: {} bytes", bytes.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod events;
pub mod inflight;
pub mod observers;
pub mod stats;
pub mod subscription;

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::app::client::Transport;
use crate::app::key::RemoteKey;
use crate::app::store::ContentStore;
use crate::errors::{AppError, CacheResult, KeyError, Result, TransportError};

pub use config::CoordinatorConfig;
pub use events::{FetchEvent, FetchOutcome, FetchResult};
pub use inflight::{FetchState, InFlightInfo, InFlightRequest, Waiter};
pub use observers::{BroadcastReport, Observer, ObserverId, ObserverRegistry};
pub use stats::CoordinatorStats;
pub use subscription::{FetchSubscription, RequestOutcome};

use observers::panic_message;
use stats::StatsCounters;

/// How a waiter was attached to the in-flight table
enum Registration {
    /// Joined a pending fetch
    Joined,
    /// Entry already terminal but not yet removed; deliver its outcome now
    Late(Waiter, FetchResult),
    /// No entry existed; this caller starts the fetch
    Started,
}

struct Inner {
    config: CoordinatorConfig,
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn Transport>,
    in_flight: Mutex<HashMap<RemoteKey, InFlightRequest>>,
    observers: ObserverRegistry,
    counters: StatsCounters,
    runtime: Handle,
}

/// Serves remote resources from the store, coalescing concurrent fetches
///
/// Cloning is cheap and every clone shares the same in-flight table,
/// observers and statistics. Construct one per store at startup and hand
/// clones to consumers.
#[derive(Clone)]
pub struct FetchCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("config", &self.inner.config)
            .field("store", &self.inner.store)
            .field("transport", &self.inner.transport)
            .field("in_flight", &self.inner.in_flight.lock().len())
            .field("observers", &self.inner.observers)
            .finish()
    }
}

impl FetchCoordinator {
    /// Create a coordinator whose fetches run on `runtime`
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn Transport>,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                in_flight: Mutex::new(HashMap::new()),
                observers: ObserverRegistry::new(),
                counters: StatsCounters::default(),
                runtime,
            }),
        }
    }

    /// Create a coordinator on the runtime of the calling context
    ///
    /// # Errors
    ///
    /// Returns `AppError` when called outside a tokio runtime
    pub fn with_current_runtime(
        config: CoordinatorConfig,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| AppError::generic(format!("No tokio runtime available: {}", e)))?;
        Ok(Self::new(config, store, transport, runtime))
    }

    /// Get the coordinator configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Get the content store
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.inner.store
    }

    /// Get the observer registry
    pub fn observers(&self) -> &ObserverRegistry {
        &self.inner.observers
    }

    /// Register an observer for every fetch outcome
    pub fn add_observer<O>(&self, observer: O) -> ObserverId
    where
        O: Observer + 'static,
    {
        self.inner.observers.add_observer(observer)
    }

    /// Remove an observer; a no-op for unknown ids
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.observers.remove_observer(id)
    }

    /// Request the payload for `key`
    ///
    /// Returns [`RequestOutcome::Cached`] when the store holds the key.
    /// Otherwise the caller is attached to the fetch in flight for the key,
    /// starting one if there is none, and receives a subscription resolving
    /// to its outcome. Never waits on the network.
    ///
    /// # Errors
    ///
    /// Returns `KeyError` if `key` is empty after normalization
    pub async fn request(&self, key: &str) -> std::result::Result<RequestOutcome, KeyError> {
        let key = RemoteKey::new(key)?;
        Ok(self.request_key(key).await)
    }

    /// [`request`](Self::request) for an already normalized key
    pub async fn request_key(&self, key: RemoteKey) -> RequestOutcome {
        if let Some(bytes) = self.lookup(&key).await {
            return RequestOutcome::Cached(bytes);
        }

        let (sender, receiver) = oneshot::channel();
        self.register(key.clone(), Waiter::Channel(sender));
        RequestOutcome::Pending(FetchSubscription::new(key, receiver))
    }

    /// Callback flavour of [`request`](Self::request)
    ///
    /// Returns `Some(bytes)` on a cache hit, in which case `callback` is
    /// dropped without being called. Returns `None` when a fetch is in
    /// flight; `callback` is then called exactly once with its outcome, on
    /// the coordinator's runtime.
    ///
    /// # Errors
    ///
    /// Returns `KeyError` if `key` is empty after normalization
    pub async fn request_with<F>(
        &self,
        key: &str,
        callback: F,
    ) -> std::result::Result<Option<Bytes>, KeyError>
    where
        F: FnOnce(FetchResult) + Send + 'static,
    {
        let key = RemoteKey::new(key)?;
        if let Some(bytes) = self.lookup(&key).await {
            return Ok(Some(bytes));
        }

        self.register(key, Waiter::Callback(Box::new(callback)));
        Ok(None)
    }

    /// Request `key` and wait for the payload
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the key is invalid or the fetch failed
    pub async fn fetch(&self, key: &str) -> Result<Bytes> {
        let outcome = self.request(key).await?;
        Ok(outcome.into_result().await?)
    }

    /// Remove `key` from the store
    ///
    /// A fetch in flight for the key still delivers to its waiters and
    /// observers, but its payload is not written back.
    ///
    /// # Errors
    ///
    /// Returns `AppError` if the key is invalid or the store removal failed
    pub async fn invalidate(&self, key: &str) -> Result<bool> {
        let key = RemoteKey::new(key)?;
        if let Some(entry) = self.inner.in_flight.lock().get_mut(&key) {
            entry.invalidate();
        }
        Ok(self.inner.store.remove(&key).await?)
    }

    /// Remove every entry from the store, with the same in-flight policy as
    /// [`invalidate`](Self::invalidate)
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the store could not be cleared
    pub async fn clear_cache(&self) -> CacheResult<usize> {
        for entry in self.inner.in_flight.lock().values_mut() {
            entry.invalidate();
        }
        self.inner.store.clear().await
    }

    /// Whether a fetch for `key` is currently tracked
    pub fn is_in_flight(&self, key: &str) -> bool {
        match RemoteKey::new(key) {
            Ok(key) => self.inner.in_flight.lock().contains_key(&key),
            Err(_) => false,
        }
    }

    /// Snapshot of the fetches currently tracked
    pub fn in_flight(&self) -> Vec<InFlightInfo> {
        let mut infos: Vec<InFlightInfo> = self
            .inner
            .in_flight
            .lock()
            .values()
            .map(InFlightRequest::info)
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    /// Current statistics
    pub fn stats(&self) -> CoordinatorStats {
        let in_flight = self.inner.in_flight.lock().len();
        self.inner
            .counters
            .snapshot(self.inner.observers.failure_count(), in_flight)
    }

    async fn lookup(&self, key: &RemoteKey) -> Option<Bytes> {
        let counters = &self.inner.counters;
        StatsCounters::incr(&counters.requests);

        match self.inner.store.get(key).await {
            Ok(Some(bytes)) => {
                StatsCounters::incr(&counters.cache_hits);
                debug!("Cache hit for {} ({} bytes)", key, bytes.len());
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                StatsCounters::incr(&counters.cache_read_errors);
                warn!("Treating cache read failure as a miss: {}", e);
                None
            }
        }
    }

    /// Attach `waiter` to the fetch for `key`, starting one if needed
    ///
    /// Check, attach and create happen under one lock acquisition, so two
    /// callers can never both decide to start a fetch for the same key.
    fn register(&self, key: RemoteKey, waiter: Waiter) {
        let registration = {
            let mut table = self.inner.in_flight.lock();
            match table.get_mut(&key) {
                Some(entry) => match entry.terminal_result() {
                    None => {
                        entry.add_waiter(waiter);
                        Registration::Joined
                    }
                    Some(result) => Registration::Late(waiter, result),
                },
                None => {
                    table.insert(key.clone(), InFlightRequest::new(key.clone(), waiter));
                    Registration::Started
                }
            }
        };

        match registration {
            Registration::Joined => {
                StatsCounters::incr(&self.inner.counters.joined_waiters);
                debug!("Joined fetch in flight for {}", key);
            }
            Registration::Late(waiter, result) => {
                StatsCounters::incr(&self.inner.counters.joined_waiters);
                debug!("Fetch for {} already finished, delivering its outcome", key);
                let coordinator = self.clone();
                self.inner.runtime.spawn(async move {
                    coordinator.deliver(&key, waiter, result);
                });
            }
            Registration::Started => {
                let coordinator = self.clone();
                self.inner.runtime.spawn(async move {
                    coordinator.run_fetch(key).await;
                });
            }
        }
    }

    /// Drive one fetch from transport call to table removal and broadcast
    ///
    /// The store is read again first: a caller that missed the store while
    /// an earlier fetch was finishing can register after that fetch wrote
    /// its payload and left the table. Such an entry is answered from the
    /// store without a transport call or a broadcast.
    async fn run_fetch(self, key: RemoteKey) {
        match self.inner.store.get(&key).await {
            Ok(Some(bytes)) => {
                StatsCounters::incr(&self.inner.counters.cache_hits);
                debug!("{} was stored by an earlier fetch, skipping transport", key);
                self.complete(&key, &Ok(bytes));
                return;
            }
            Ok(None) => {}
            Err(e) => debug!("Store recheck for {} failed, fetching: {}", key, e),
        }

        StatsCounters::incr(&self.inner.counters.fetches_started);
        info!("Starting fetch for {}", key);
        let started = Instant::now();

        let result: FetchResult = AssertUnwindSafe(self.inner.transport.fetch(&key))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(TransportError::Other(format!(
                    "transport panicked: {}",
                    panic_message(panic.as_ref())
                )))
            })
            .map_err(Arc::new);

        let persisted = match &result {
            Ok(bytes) if self.inner.config.persist_results => {
                self.persist(&key, bytes.clone()).await
            }
            _ => false,
        };

        let waiter_count = self.complete(&key, &result);

        let elapsed = started.elapsed();
        match &result {
            Ok(bytes) => {
                StatsCounters::incr(&self.inner.counters.fetches_succeeded);
                info!(
                    "Fetched {} ({} bytes) in {:.2}s for {} waiter(s)",
                    key,
                    bytes.len(),
                    elapsed.as_secs_f64(),
                    waiter_count
                );
            }
            Err(e) => {
                StatsCounters::incr(&self.inner.counters.fetches_failed);
                warn!(
                    "Fetch for {} failed after {:.2}s ({} waiter(s)): {}",
                    key,
                    elapsed.as_secs_f64(),
                    waiter_count,
                    e
                );
            }
        }
        if let Some(threshold) = self.inner.config.slow_fetch_threshold {
            if elapsed > threshold {
                warn!("Slow fetch for {}: {:.2}s", key, elapsed.as_secs_f64());
            }
        }

        let event = FetchEvent::from_result(key, &result, persisted);
        self.inner.observers.broadcast(&event);
    }

    /// Move the entry for `key` to its terminal state, hand `result` to
    /// every waiter and drop the entry; returns the number of waiters
    fn complete(&self, key: &RemoteKey, result: &FetchResult) -> usize {
        let waiters = self
            .inner
            .in_flight
            .lock()
            .get_mut(key)
            .and_then(|entry| entry.finish(result))
            .unwrap_or_default();

        let waiter_count = waiters.len();
        for waiter in waiters {
            self.deliver(key, waiter, result.clone());
        }

        self.inner.in_flight.lock().remove(key);
        waiter_count
    }

    /// Write a fetched payload, honouring invalidations that race with it
    ///
    /// Returns whether the payload is in the store afterwards.
    async fn persist(&self, key: &RemoteKey, bytes: Bytes) -> bool {
        if self.is_invalidated(key) {
            debug!("Skipping store write for invalidated {}", key);
            return false;
        }

        if let Err(e) = self.inner.store.put(key, bytes).await {
            StatsCounters::incr(&self.inner.counters.persist_failures);
            warn!("{} (payload still delivered)", e);
            return false;
        }

        if self.is_invalidated(key) {
            debug!("{} invalidated during store write, removing it again", key);
            if let Err(e) = self.inner.store.remove(key).await {
                warn!("Failed to drop invalidated entry {}: {}", key, e);
            }
            return false;
        }
        true
    }

    fn is_invalidated(&self, key: &RemoteKey) -> bool {
        self.inner
            .in_flight
            .lock()
            .get(key)
            .map(InFlightRequest::is_invalidated)
            .unwrap_or(false)
    }

    fn deliver(&self, key: &RemoteKey, waiter: Waiter, result: FetchResult) {
        if !waiter.complete(key, result) {
            StatsCounters::incr(&self.inner.counters.waiter_panics);
        }
    }
}

#[cfg(test)]
pub mod tests;
