//! Core application logic for Remote Data
//!
//! This module contains the content store, the transport client, the fetch
//! coordinator tying them together, and the key type they all share.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use remote_data::app::{
//!     CoordinatorConfig, FetchCoordinator, HttpTransport, MemoryStore, RequestOutcome,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = FetchCoordinator::with_current_runtime(
//!     CoordinatorConfig::default(),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(HttpTransport::new()?),
//! )?;
//!
//! if let RequestOutcome::Pending(subscription) = coordinator.request("a.jpg").await? {
//!     let bytes = subscription.await?;
//!     println!("Fetched {} bytes", bytes.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod coordinator;
pub mod key;
pub mod store;

// Re-export main public API
pub use client::{ClientConfig, HttpTransport, Transport};
pub use coordinator::{
    BroadcastReport, CoordinatorConfig, CoordinatorStats, FetchCoordinator, FetchEvent,
    FetchOutcome, FetchResult, FetchSubscription, InFlightInfo, Observer, ObserverId,
    ObserverRegistry, RequestOutcome,
};
pub use key::RemoteKey;
pub use store::{ContentStore, DiskStore, MemoryStore, StoreConfig, StoreStats};
