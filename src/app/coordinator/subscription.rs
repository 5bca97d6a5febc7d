//! Request outcomes and pending-fetch subscriptions

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::app::key::RemoteKey;
use crate::errors::TransportError;

use super::events::FetchResult;

/// Immediate answer to a request
#[derive(Debug)]
pub enum RequestOutcome {
    /// The store already held the payload
    Cached(Bytes),
    /// A fetch is in flight; await the subscription for its outcome
    Pending(FetchSubscription),
}

impl RequestOutcome {
    /// Whether the payload came straight from the store
    pub fn is_cached(&self) -> bool {
        matches!(self, RequestOutcome::Cached(_))
    }

    /// Resolve to the payload, waiting for the fetch if needed
    pub async fn into_result(self) -> FetchResult {
        match self {
            RequestOutcome::Cached(bytes) => Ok(bytes),
            RequestOutcome::Pending(subscription) => subscription.await,
        }
    }
}

/// Future resolving to the outcome of the fetch a request attached to
///
/// Dropping it is how a caller stops caring; the coordinator still completes
/// the fetch for everyone else.
#[derive(Debug)]
pub struct FetchSubscription {
    key: RemoteKey,
    receiver: oneshot::Receiver<FetchResult>,
}

impl FetchSubscription {
    pub(crate) fn new(key: RemoteKey, receiver: oneshot::Receiver<FetchResult>) -> Self {
        Self { key, receiver }
    }

    /// Key the subscription is waiting on
    pub fn key(&self) -> &RemoteKey {
        &self.key
    }
}

impl Future for FetchSubscription {
    type Output = FetchResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Only happens if the fetch task was torn down with its runtime
            Poll::Ready(Err(_)) => Poll::Ready(Err(Arc::new(TransportError::Other(format!(
                "fetch for {} was abandoned before completion",
                self.key
            ))))),
            Poll::Pending => Poll::Pending,
        }
    }
}
