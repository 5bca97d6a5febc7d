//! Observer registry
//!
//! Observers receive a [`FetchEvent`] for every completed fetch, including
//! fetches they never requested. Each observer sits behind its own lock so
//! that invoking it and removing it are mutually exclusive for that observer
//! only: once [`ObserverRegistry::remove_observer`] returns, the observer is
//! never called again, while broadcasts to other observers carry on. The
//! lock is reentrant, so an observer may remove itself from inside its own
//! callback.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ObserverError;

use super::events::FetchEvent;

/// Receiver of fetch events
///
/// Errors and panics are contained by the registry; they never affect the
/// fetch or other observers.
pub trait Observer: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &FetchEvent) -> Result<(), ObserverError>;
}

impl<F> Observer for F
where
    F: Fn(&FetchEvent) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_event(&self, event: &FetchEvent) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Registration handle, used for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Result of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Observers that handled the event
    pub delivered: usize,
    /// Observers that returned an error or panicked
    pub failed: usize,
}

struct ObserverSlot {
    observer: ReentrantMutex<RefCell<Option<Arc<dyn Observer>>>>,
}

/// Set of observers notified of every fetch outcome
pub struct ObserverRegistry {
    next_id: AtomicU64,
    slots: RwLock<Vec<(ObserverId, Arc<ObserverSlot>)>>,
    failures: AtomicU64,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .field("failures", &self.failure_count())
            .finish()
    }
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            slots: RwLock::new(Vec::new()),
            failures: AtomicU64::new(0),
        }
    }

    /// Register an observer
    pub fn add_observer<O>(&self, observer: O) -> ObserverId
    where
        O: Observer + 'static,
    {
        self.add_shared(Arc::new(observer))
    }

    /// Register an observer that is already shared
    pub fn add_shared(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(ObserverSlot {
            observer: ReentrantMutex::new(RefCell::new(Some(observer))),
        });
        self.slots.write().push((id, slot));
        debug!("Registered {}", id);
        id
    }

    /// Remove an observer; unknown or already removed ids are a no-op
    ///
    /// Waits for an in-progress invocation of this observer on another
    /// thread to finish, so the observer is never called after this returns.
    ///
    /// # Deadlocks
    ///
    /// A broadcast holds an observer's lock for the whole callback. If
    /// observer X removes Y from its callback while a broadcast on another
    /// thread is inside Y removing X, each waits on the other forever.
    /// Callbacks may remove themselves freely; removing a different
    /// observer from a callback is only safe when no concurrent broadcast
    /// can be invoking that observer.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let slot = {
            let mut slots = self.slots.write();
            match slots.iter().position(|(slot_id, _)| *slot_id == id) {
                Some(index) => slots.remove(index).1,
                None => return false,
            }
        };

        let guard = slot.observer.lock();
        guard.borrow_mut().take();
        debug!("Removed {}", id);
        true
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no observers are registered
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Total observer errors and panics since creation
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliver `event` to every registered observer
    pub fn broadcast(&self, event: &FetchEvent) -> BroadcastReport {
        let snapshot: Vec<(ObserverId, Arc<ObserverSlot>)> = self
            .slots
            .read()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, slot) in snapshot {
            let guard = slot.observer.lock();
            let current = guard.borrow().clone();
            let Some(observer) = current else {
                continue;
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| observer.on_event(event)))
                .unwrap_or_else(|panic| {
                    Err(ObserverError::Panicked(panic_message(panic.as_ref())))
                });
            drop(guard);

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!("{} failed handling event for {}: {}", id, event.key, e);
                }
            }
        }
        report
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
