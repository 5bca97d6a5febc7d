//! Remote Data Library
//!
//! A single-flight cache for remote resources. Requests are answered from a
//! local content store when possible; otherwise concurrent requests for the
//! same key share one transport fetch, and every fetch outcome is broadcast
//! to registered observers.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
