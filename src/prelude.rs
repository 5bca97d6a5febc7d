//! Prelude module for Remote Data Library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use remote_data::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use remote_data::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // All common types are now available
//!     let store = Arc::new(DiskStore::new(StoreConfig::default()).await?);
//!     let transport = Arc::new(HttpTransport::new()?);
//!     let coordinator =
//!         FetchCoordinator::with_current_runtime(CoordinatorConfig::default(), store, transport)?;
//!
//!     let bytes = coordinator.fetch("images/a.jpg").await?;
//!     println!("{} bytes", bytes.len());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    ClientConfig,
    ContentStore,
    CoordinatorConfig,
    DiskStore,
    FetchCoordinator,
    FetchEvent,
    FetchOutcome,
    FetchSubscription,
    HttpTransport,
    MemoryStore,
    Observer,
    ObserverId,
    RemoteKey,
    RequestOutcome,
    StoreConfig,
    Transport,
};
