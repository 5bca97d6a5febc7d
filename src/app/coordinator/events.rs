//! Typed fetch events delivered to observers

use bytes::Bytes;

use crate::app::key::RemoteKey;
use crate::errors::FetchError;

/// Terminal outcome of one fetch, shared by every waiter of that fetch
pub type FetchResult = Result<Bytes, FetchError>;

/// Outcome carried by a [`FetchEvent`]
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Payload fetched; `persisted` is false when the store write failed or
    /// was skipped, meaning a later request will miss the cache
    Fetched { bytes: Bytes, persisted: bool },
    /// Fetch failed; nothing was written to the store
    Failed(FetchError),
}

/// Broadcast sent to every registered observer when a fetch completes
#[derive(Debug, Clone)]
pub struct FetchEvent {
    /// Key the fetch was issued for
    pub key: RemoteKey,
    /// What happened
    pub outcome: FetchOutcome,
}

impl FetchEvent {
    /// Event for a successful fetch
    pub fn fetched(key: RemoteKey, bytes: Bytes, persisted: bool) -> Self {
        Self {
            key,
            outcome: FetchOutcome::Fetched { bytes, persisted },
        }
    }

    /// Event for a failed fetch
    pub fn failed(key: RemoteKey, error: FetchError) -> Self {
        Self {
            key,
            outcome: FetchOutcome::Failed(error),
        }
    }

    /// Build the event matching a fetch result
    pub fn from_result(key: RemoteKey, result: &FetchResult, persisted: bool) -> Self {
        match result {
            Ok(bytes) => Self::fetched(key, bytes.clone(), persisted),
            Err(error) => Self::failed(key, error.clone()),
        }
    }

    /// Whether the fetch succeeded
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, FetchOutcome::Fetched { .. })
    }

    /// Payload, if the fetch succeeded
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.outcome {
            FetchOutcome::Fetched { bytes, .. } => Some(bytes),
            FetchOutcome::Failed(_) => None,
        }
    }

    /// Error, if the fetch failed
    pub fn error(&self) -> Option<&FetchError> {
        match &self.outcome {
            FetchOutcome::Failed(error) => Some(error),
            FetchOutcome::Fetched { .. } => None,
        }
    }
}
