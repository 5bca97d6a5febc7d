//! In-flight request bookkeeping
//!
//! One [`InFlightRequest`] exists per key while its fetch is outstanding. It
//! collects the waiters that attached to the fetch and moves exactly once
//! from `Pending` to a terminal state.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::warn;

use crate::app::key::RemoteKey;
use crate::errors::FetchError;

use super::events::FetchResult;
use super::observers::panic_message;

/// Single-fire completion handle registered by a caller
///
/// Both variants are consumed by [`Waiter::complete`], so a handle can never
/// be invoked twice.
pub enum Waiter {
    /// Result is sent over a one-shot channel
    Channel(oneshot::Sender<FetchResult>),
    /// Result is passed to a callback
    Callback(Box<dyn FnOnce(FetchResult) + Send + 'static>),
}

impl Waiter {
    /// Deliver the result, isolating panics raised by callbacks
    ///
    /// Returns false if a callback panicked. A dropped receiver is not an
    /// error: the caller lost interest.
    pub fn complete(self, key: &RemoteKey, result: FetchResult) -> bool {
        match self {
            Waiter::Channel(sender) => {
                let _ = sender.send(result);
                true
            }
            Waiter::Callback(callback) => {
                match catch_unwind(AssertUnwindSafe(move || callback(result))) {
                    Ok(()) => true,
                    Err(panic) => {
                        warn!(
                            "Completion callback for {} panicked: {}",
                            key,
                            panic_message(panic.as_ref())
                        );
                        false
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waiter::Channel(_) => f.write_str("Waiter::Channel"),
            Waiter::Callback(_) => f.write_str("Waiter::Callback"),
        }
    }
}

/// State of an in-flight fetch
#[derive(Debug, Clone)]
pub enum FetchState {
    /// Transport fetch outstanding
    Pending,
    /// Fetch succeeded; waiters are being drained
    Completed(Bytes),
    /// Fetch failed; waiters are being drained
    Failed(FetchError),
}

impl FetchState {
    /// Short label for logs and listings
    pub fn label(&self) -> &'static str {
        match self {
            FetchState::Pending => "pending",
            FetchState::Completed(_) => "completed",
            FetchState::Failed(_) => "failed",
        }
    }
}

/// One outstanding fetch and its waiters
#[derive(Debug)]
pub struct InFlightRequest {
    key: RemoteKey,
    waiters: Vec<Waiter>,
    state: FetchState,
    started_at: DateTime<Utc>,
    invalidated: bool,
}

/// Read-only snapshot of an in-flight request
#[derive(Debug, Clone, Serialize)]
pub struct InFlightInfo {
    /// Key being fetched
    pub key: RemoteKey,
    /// When the fetch started
    pub started_at: DateTime<Utc>,
    /// Waiters not yet completed
    pub waiter_count: usize,
    /// `pending`, `completed` or `failed`
    pub state: &'static str,
    /// Whether the store entry was invalidated while the fetch ran
    pub invalidated: bool,
}

impl InFlightRequest {
    /// Create a pending request with its first waiter
    pub fn new(key: RemoteKey, first_waiter: Waiter) -> Self {
        Self {
            key,
            waiters: vec![first_waiter],
            state: FetchState::Pending,
            started_at: Utc::now(),
            invalidated: false,
        }
    }

    /// Key being fetched
    pub fn key(&self) -> &RemoteKey {
        &self.key
    }

    /// Current state
    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Whether the transport fetch is still outstanding
    pub fn is_pending(&self) -> bool {
        matches!(self.state, FetchState::Pending)
    }

    /// Number of waiters not yet completed
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    /// Attach another waiter to a pending fetch
    pub fn add_waiter(&mut self, waiter: Waiter) {
        debug_assert!(self.is_pending(), "waiter added to a terminal request");
        self.waiters.push(waiter);
    }

    /// Move to the terminal state for `result` and hand back the waiters
    ///
    /// Returns `None` if the request had already left `Pending`; the first
    /// outcome wins.
    pub fn finish(&mut self, result: &FetchResult) -> Option<Vec<Waiter>> {
        if !self.is_pending() {
            return None;
        }
        self.state = match result {
            Ok(bytes) => FetchState::Completed(bytes.clone()),
            Err(error) => FetchState::Failed(error.clone()),
        };
        Some(std::mem::take(&mut self.waiters))
    }

    /// Outcome to hand to a caller that arrives after completion but before
    /// removal; `None` while pending
    pub fn terminal_result(&self) -> Option<FetchResult> {
        match &self.state {
            FetchState::Pending => None,
            FetchState::Completed(bytes) => Some(Ok(bytes.clone())),
            FetchState::Failed(error) => Some(Err(error.clone())),
        }
    }

    /// Mark the store entry for this key as cleared while the fetch runs
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Whether the entry was cleared while the fetch ran
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Snapshot for listings
    pub fn info(&self) -> InFlightInfo {
        InFlightInfo {
            key: self.key.clone(),
            started_at: self.started_at,
            waiter_count: self.waiters.len(),
            state: self.state.label(),
            invalidated: self.invalidated,
        }
    }
}
