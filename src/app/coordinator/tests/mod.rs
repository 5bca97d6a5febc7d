//! Unit tests for the fetch coordinator
//!
//! These drive the coordinator against an in-memory store and a scripted
//! transport whose fetches can be held open, so that concurrent requests
//! deterministically land on the same in-flight entry. End-to-end tests
//! against the disk store and HTTP transport live in the top-level tests
//! directory.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::app::client::Transport;
use crate::app::key::RemoteKey;
use crate::app::store::{ContentStore, MemoryStore, StoreStats};
use crate::errors::{CacheError, CacheResult, ObserverError, TransportError, TransportResult};

use super::*;

/// Scripted transport counting its calls
///
/// A gated transport holds every fetch until [`MockTransport::release`]
/// hands out a permit.
#[derive(Debug, Default)]
pub struct MockTransport {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    failure_status: Option<u16>,
    panics: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Default::default()
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            failure_status: Some(status),
            ..Default::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Default::default()
        }
    }

    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn payload_for(key: &str) -> Bytes {
        Bytes::from(format!("payload:{}", key))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, key: &RemoteKey) -> TransportResult<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?
                .forget();
        }
        if self.panics {
            panic!("transport bug");
        }
        if let Some(status) = self.failure_status {
            return Err(TransportError::ServerError { status });
        }
        Ok(Self::payload_for(key.as_str()))
    }
}

/// Store whose writes always fail
#[derive(Debug, Default)]
pub struct ReadOnlyStore {
    inner: MemoryStore,
}

#[async_trait]
impl ContentStore for ReadOnlyStore {
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.has(key).await
    }

    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &RemoteKey, _bytes: Bytes) -> CacheResult<()> {
        Err(CacheError::Persist {
            key: key.to_string(),
            reason: "disk full".to_string(),
        })
    }

    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> CacheResult<usize> {
        self.inner.clear().await
    }

    async fn stats(&self) -> StoreStats {
        self.inner.stats().await
    }
}

/// Store whose reads always fail
#[derive(Debug, Default)]
pub struct UnreadableStore {
    inner: MemoryStore,
}

#[async_trait]
impl ContentStore for UnreadableStore {
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.has(key).await
    }

    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>> {
        Err(CacheError::Read {
            key: key.to_string(),
            reason: "corrupt entry".to_string(),
        })
    }

    async fn put(&self, key: &RemoteKey, bytes: Bytes) -> CacheResult<()> {
        self.inner.put(key, bytes).await
    }

    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> CacheResult<usize> {
        self.inner.clear().await
    }

    async fn stats(&self) -> StoreStats {
        self.inner.stats().await
    }
}

/// Store that can hold its next read open after taking the answer
///
/// Lets a test freeze a caller between its store miss and its registration.
#[derive(Debug)]
pub struct PausingStore {
    inner: MemoryStore,
    pause_next_read: AtomicBool,
    paused_reads: AtomicUsize,
    gate: Semaphore,
}

impl PausingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            pause_next_read: AtomicBool::new(false),
            paused_reads: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    pub fn pause_next_read(&self) {
        self.pause_next_read.store(true, Ordering::SeqCst);
    }

    pub fn paused_reads(&self) -> usize {
        self.paused_reads.load(Ordering::SeqCst)
    }

    pub fn resume(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl ContentStore for PausingStore {
    async fn has(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.has(key).await
    }

    async fn get(&self, key: &RemoteKey) -> CacheResult<Option<Bytes>> {
        let answer = self.inner.get(key).await;
        if self.pause_next_read.swap(false, Ordering::SeqCst) {
            self.paused_reads.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|e| CacheError::Read {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?
                .forget();
        }
        answer
    }

    async fn put(&self, key: &RemoteKey, bytes: Bytes) -> CacheResult<()> {
        self.inner.put(key, bytes).await
    }

    async fn remove(&self, key: &RemoteKey) -> CacheResult<bool> {
        self.inner.remove(key).await
    }

    async fn clear(&self) -> CacheResult<usize> {
        self.inner.clear().await
    }

    async fn stats(&self) -> StoreStats {
        self.inner.stats().await
    }
}

/// Yield until `condition` holds
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never held");
}

/// Create a coordinator on the test runtime
pub fn create_test_coordinator(
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn Transport>,
) -> FetchCoordinator {
    FetchCoordinator::new(CoordinatorConfig::default(), store, transport, Handle::current())
}

fn key(raw: &str) -> RemoteKey {
    RemoteKey::new(raw).unwrap()
}

/// Observer recording how many successes and failures it saw
fn recording_observer(
    successes: &Arc<AtomicUsize>,
    failures: &Arc<AtomicUsize>,
) -> impl Observer + 'static {
    let successes = Arc::clone(successes);
    let failures = Arc::clone(failures);
    move |event: &FetchEvent| -> std::result::Result<(), ObserverError> {
        if event.is_success() {
            successes.fetch_add(1, Ordering::SeqCst);
        } else {
            failures.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Concurrent requests for one key share a single transport fetch
#[tokio::test]
async fn test_concurrent_requests_single_fetch() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(store.clone(), transport.clone());

    let outcomes = join_all((0..5).map(|_| coordinator.request("a.jpg"))).await;
    assert_eq!(coordinator.in_flight().len(), 1);
    assert_eq!(coordinator.in_flight()[0].waiter_count, 5);

    transport.release(1);
    for outcome in outcomes {
        let outcome = outcome.unwrap();
        assert!(!outcome.is_cached());
        assert_eq!(
            outcome.into_result().await.unwrap(),
            MockTransport::payload_for("a.jpg")
        );
    }

    assert_eq!(transport.calls(), 1);
    assert!(store.has(&key("a.jpg")).await.unwrap());
    assert!(!coordinator.is_in_flight("a.jpg"));

    let stats = coordinator.stats();
    assert_eq!(stats.fetches_started, 1);
    assert_eq!(stats.joined_waiters, 4);
    assert_eq!(stats.fetches_succeeded, 1);
}

/// Distinct keys are fetched independently
#[tokio::test]
async fn test_distinct_keys_fetch_separately() {
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(Arc::new(MemoryStore::new()), transport.clone());

    let a = coordinator.request("a.jpg").await.unwrap();
    let b = coordinator.request("b.jpg").await.unwrap();

    let listed: Vec<String> = coordinator
        .in_flight()
        .into_iter()
        .map(|info| info.key.to_string())
        .collect();
    assert_eq!(listed, vec!["a.jpg", "b.jpg"]);

    transport.release(2);
    assert_eq!(a.into_result().await.unwrap(), MockTransport::payload_for("a.jpg"));
    assert_eq!(b.into_result().await.unwrap(), MockTransport::payload_for("b.jpg"));
    assert_eq!(transport.calls(), 2);
}

/// A stored key is answered without touching the transport
#[tokio::test]
async fn test_cache_hit_skips_transport() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(&key("a.jpg"), Bytes::from_static(b"cached"))
        .await
        .unwrap();
    let transport = Arc::new(MockTransport::new());
    let coordinator = create_test_coordinator(store, transport.clone());

    match coordinator.request(" a.jpg ").await.unwrap() {
        RequestOutcome::Cached(bytes) => assert_eq!(bytes, Bytes::from_static(b"cached")),
        RequestOutcome::Pending(_) => panic!("expected a cache hit"),
    }

    assert_eq!(transport.calls(), 0);
    assert_eq!(coordinator.stats().cache_hits, 1);
    assert!(coordinator.in_flight().is_empty());
}

/// Callback flavour returns cached bytes directly and drops the callback
#[tokio::test]
async fn test_request_with_cache_hit() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(&key("a.jpg"), Bytes::from_static(b"cached"))
        .await
        .unwrap();
    let coordinator = create_test_coordinator(store, Arc::new(MockTransport::new()));

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let hit = coordinator
        .request_with("a.jpg", move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    assert_eq!(hit, Some(Bytes::from_static(b"cached")));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

/// Callback flavour is invoked exactly once with the fetched bytes
#[tokio::test]
async fn test_request_with_callback_on_fetch() {
    let transport = Arc::new(MockTransport::new());
    let coordinator = create_test_coordinator(Arc::new(MemoryStore::new()), transport.clone());

    let (tx, rx) = tokio::sync::oneshot::channel();
    let pending = coordinator
        .request_with("a.jpg", move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();

    assert!(pending.is_none());
    assert_eq!(rx.await.unwrap().unwrap(), MockTransport::payload_for("a.jpg"));
    assert_eq!(transport.calls(), 1);
}

/// A failed fetch reaches every waiter, leaves nothing behind, and the
/// next request starts a fresh fetch
#[tokio::test]
async fn test_failure_propagates_and_allows_retry() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport {
        gate: Some(Semaphore::new(0)),
        ..MockTransport::failing(500)
    });
    let coordinator = create_test_coordinator(store.clone(), transport.clone());

    let first = coordinator.request("a.jpg").await.unwrap();
    let second = coordinator.request("a.jpg").await.unwrap();
    transport.release(2);

    for outcome in [first, second] {
        let err = outcome.into_result().await.unwrap_err();
        assert!(matches!(*err, TransportError::ServerError { status: 500 }));
    }
    assert_eq!(transport.calls(), 1);
    assert!(!coordinator.is_in_flight("a.jpg"));
    assert!(store.is_empty().await);

    let err = coordinator.fetch("a.jpg").await.unwrap_err();
    assert_eq!(err.category(), "transport");
    assert_eq!(transport.calls(), 2);
    assert_eq!(coordinator.stats().fetches_failed, 2);
}

/// Observers see every outcome, including fetches they did not request
#[tokio::test]
async fn test_observers_receive_broadcasts() {
    let coordinator =
        create_test_coordinator(Arc::new(MemoryStore::new()), Arc::new(MockTransport::new()));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    coordinator.add_observer(recording_observer(&successes, &failures));

    coordinator.fetch("a.jpg").await.unwrap();
    coordinator.fetch("b.jpg").await.unwrap();
    // Cache hits are not broadcast
    coordinator.fetch("a.jpg").await.unwrap();

    assert_eq!(successes.load(Ordering::SeqCst), 2);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

/// A removed observer is not invoked for later fetches
#[tokio::test]
async fn test_removed_observer_not_notified() {
    let coordinator =
        create_test_coordinator(Arc::new(MemoryStore::new()), Arc::new(MockTransport::new()));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let id = coordinator.add_observer(recording_observer(&successes, &failures));

    coordinator.fetch("a.jpg").await.unwrap();
    assert!(coordinator.remove_observer(id));
    coordinator.fetch("b.jpg").await.unwrap();

    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert!(coordinator.observers().is_empty());
}

/// A failing observer affects neither the fetch nor other observers
#[tokio::test]
async fn test_observer_failure_is_isolated() {
    let coordinator =
        create_test_coordinator(Arc::new(MemoryStore::new()), Arc::new(MockTransport::new()));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));

    coordinator.add_observer(|_: &FetchEvent| -> std::result::Result<(), ObserverError> {
        panic!("observer bug");
    });
    coordinator.add_observer(recording_observer(&successes, &failures));

    let bytes = coordinator.fetch("a.jpg").await.unwrap();
    assert_eq!(bytes, MockTransport::payload_for("a.jpg"));
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.stats().observer_failures, 1);
}

/// A store write failure still delivers the payload, and the next request
/// misses the cache
#[tokio::test]
async fn test_persist_failure_still_delivers() {
    let transport = Arc::new(MockTransport::new());
    let coordinator = create_test_coordinator(Arc::new(ReadOnlyStore::default()), transport.clone());

    let persisted = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let persisted_clone = Arc::clone(&persisted);
    coordinator.add_observer(move |event: &FetchEvent| -> std::result::Result<(), ObserverError> {
        if let FetchOutcome::Fetched { persisted, .. } = &event.outcome {
            persisted_clone.lock().push(*persisted);
        }
        Ok(())
    });

    let bytes = coordinator.fetch("a.jpg").await.unwrap();
    assert_eq!(bytes, MockTransport::payload_for("a.jpg"));
    assert_eq!(*persisted.lock(), vec![false]);
    assert_eq!(coordinator.stats().persist_failures, 1);

    coordinator.fetch("a.jpg").await.unwrap();
    assert_eq!(transport.calls(), 2);
}

/// A store read failure is treated as a miss
#[tokio::test]
async fn test_read_failure_treated_as_miss() {
    let transport = Arc::new(MockTransport::new());
    let coordinator =
        create_test_coordinator(Arc::new(UnreadableStore::default()), transport.clone());

    let bytes = coordinator.fetch("a.jpg").await.unwrap();
    assert_eq!(bytes, MockTransport::payload_for("a.jpg"));
    assert_eq!(transport.calls(), 1);
    assert_eq!(coordinator.stats().cache_read_errors, 1);
}

/// Results are delivered but not stored when persistence is disabled
#[tokio::test]
async fn test_persistence_disabled() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = FetchCoordinator::new(
        CoordinatorConfig::default().with_persist_results(false),
        store.clone(),
        Arc::new(MockTransport::new()),
        Handle::current(),
    );

    coordinator.fetch("a.jpg").await.unwrap();
    assert!(store.is_empty().await);
}

/// Invalidating a key while its fetch runs keeps the payload out of the
/// store, but waiters still receive it
#[tokio::test]
async fn test_invalidate_during_fetch_does_not_resurrect() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(store.clone(), transport.clone());

    let outcome = coordinator.request("a.jpg").await.unwrap();
    assert!(!coordinator.invalidate("a.jpg").await.unwrap());
    assert!(coordinator.in_flight()[0].invalidated);

    transport.release(1);
    assert_eq!(
        outcome.into_result().await.unwrap(),
        MockTransport::payload_for("a.jpg")
    );
    assert!(!store.has(&key("a.jpg")).await.unwrap());
}

/// Clearing the cache applies the same policy to every in-flight fetch
#[tokio::test]
async fn test_clear_cache_during_fetch() {
    let store = Arc::new(MemoryStore::new());
    store
        .put(&key("old.jpg"), Bytes::from_static(b"old"))
        .await
        .unwrap();
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(store.clone(), transport.clone());

    let outcome = coordinator.request("a.jpg").await.unwrap();
    assert_eq!(coordinator.clear_cache().await.unwrap(), 1);

    transport.release(1);
    outcome.into_result().await.unwrap();
    assert!(store.is_empty().await);
}

/// A caller that missed the store while the first fetch was running, and
/// registers only after that fetch stored its payload and left the table,
/// is answered from the store without a second transport call
#[tokio::test]
async fn test_miss_before_completion_does_not_refetch() {
    let store = Arc::new(PausingStore::new());
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(store.clone(), transport.clone());

    let first = coordinator.request("a.jpg").await.unwrap();
    wait_until(|| transport.calls() == 1).await;

    store.pause_next_read();
    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.request("a.jpg").await.unwrap().into_result().await }
    });
    wait_until(|| store.paused_reads() == 1).await;

    transport.release(1);
    assert_eq!(
        first.into_result().await.unwrap(),
        MockTransport::payload_for("a.jpg")
    );
    wait_until(|| !coordinator.is_in_flight("a.jpg")).await;
    assert!(store.has(&key("a.jpg")).await.unwrap());

    store.resume();
    assert_eq!(
        second.await.unwrap().unwrap(),
        MockTransport::payload_for("a.jpg")
    );
    assert_eq!(transport.calls(), 1);

    let stats = coordinator.stats();
    assert_eq!(stats.fetches_started, 1);
    assert_eq!(stats.cache_hits, 1);
    assert!(!coordinator.is_in_flight("a.jpg"));
}

/// A request landing on a finished but not yet removed entry gets that
/// outcome without a second fetch
#[tokio::test]
async fn test_late_waiter_receives_terminal_result() {
    let transport = Arc::new(MockTransport::new());
    let coordinator = create_test_coordinator(Arc::new(MemoryStore::new()), transport.clone());

    let (late_tx, late_rx) = tokio::sync::oneshot::channel();
    let inner = coordinator.clone();
    coordinator
        .request_with("a.jpg", move |_| {
            // Runs after the entry turned terminal, before it is removed
            inner.register(key("a.jpg"), Waiter::Channel(late_tx));
        })
        .await
        .unwrap();

    assert_eq!(
        late_rx.await.unwrap().unwrap(),
        MockTransport::payload_for("a.jpg")
    );
    assert_eq!(transport.calls(), 1);
}

/// A panicking completion callback does not stop delivery to other waiters
#[tokio::test]
async fn test_callback_panic_is_isolated() {
    let transport = Arc::new(MockTransport::gated());
    let coordinator = create_test_coordinator(Arc::new(MemoryStore::new()), transport.clone());

    coordinator
        .request_with("a.jpg", |_| panic!("callback bug"))
        .await
        .unwrap();
    let outcome = coordinator.request("a.jpg").await.unwrap();

    transport.release(1);
    assert_eq!(
        outcome.into_result().await.unwrap(),
        MockTransport::payload_for("a.jpg")
    );
    assert_eq!(coordinator.stats().waiter_panics, 1);
}

/// A panicking transport becomes a failed outcome
#[tokio::test]
async fn test_transport_panic_becomes_failure() {
    let coordinator = create_test_coordinator(
        Arc::new(MemoryStore::new()),
        Arc::new(MockTransport::panicking()),
    );

    let err = coordinator.fetch("a.jpg").await.unwrap_err();
    assert!(err.to_string().contains("transport panicked"));
    assert!(!coordinator.is_in_flight("a.jpg"));
}

/// Empty keys are rejected before anything else happens
#[tokio::test]
async fn test_empty_key_rejected() {
    let transport = Arc::new(MockTransport::new());
    let coordinator = create_test_coordinator(Arc::new(MemoryStore::new()), transport.clone());

    assert!(matches!(
        coordinator.request("   ").await,
        Err(crate::errors::KeyError::Empty)
    ));
    assert!(!coordinator.is_in_flight(""));
    assert_eq!(transport.calls(), 0);
}

/// The coordinator can pick up the runtime it is created on
#[tokio::test]
async fn test_with_current_runtime() {
    let coordinator = FetchCoordinator::with_current_runtime(
        CoordinatorConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MockTransport::new()),
    )
    .unwrap();

    coordinator.fetch("a.jpg").await.unwrap();
    assert_eq!(coordinator.stats().requests, 1);
}

/// Outside a runtime, creation fails instead of panicking
#[test]
fn test_with_current_runtime_outside_runtime() {
    let result = FetchCoordinator::with_current_runtime(
        CoordinatorConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(MockTransport::new()),
    );
    assert!(result.is_err());
}
