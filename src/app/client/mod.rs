//! Remote transport
//!
//! A [`Transport`] performs exactly one remote fetch per call. The
//! coordinator decides *whether* to call it; the transport owns *how*,
//! including timeouts. The shipped [`HttpTransport`] resolves keys against a
//! base URL and issues a rate-limited GET.
//!
//! - `config`: HTTP client configuration and building
//! - `http`: Core HTTP operations with rate limiting and retries

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::app::key::RemoteKey;
use crate::errors::{TransportError, TransportResult};

pub mod config;
pub mod http;

pub use config::ClientConfig;

use http::HttpHandler;

/// One-shot asynchronous fetch of a remote resource
///
/// Called from a task spawned on the coordinator's runtime, so
/// implementations must be `Send + Sync` and must not assume they run on the
/// requesting caller's task.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Fetch the payload for `key`
    async fn fetch(&self, key: &RemoteKey) -> TransportResult<Bytes>;
}

/// HTTP transport resolving keys against a base URL
#[derive(Debug)]
pub struct HttpTransport {
    http_handler: HttpHandler,
    base_url: Url,
}

impl HttpTransport {
    /// Creates a transport with the default configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the client cannot be built
    pub fn new() -> TransportResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Creates a transport with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the base URL is invalid, the rate limit
    /// is zero, or the HTTP client cannot be built
    pub fn with_config(config: ClientConfig) -> TransportResult<Self> {
        let base_url = config.parse_base_url()?;
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(
            client,
            config.rate_limit_rps,
            config.max_retries,
            config.request_timeout,
        )?;

        tracing::info!("Created HTTP transport for {}", base_url);

        Ok(Self {
            http_handler,
            base_url,
        })
    }

    /// Resolve a key to the URL it is fetched from
    ///
    /// Absolute `http(s)://` keys are used as-is; anything else is joined
    /// onto the base URL.
    pub fn resolve(&self, key: &RemoteKey) -> TransportResult<Url> {
        let raw = key.as_str();
        let result = if raw.starts_with("http://") || raw.starts_with("https://") {
            Url::parse(raw)
        } else {
            self.base_url.join(key.relative_path())
        };

        result.map_err(|e| TransportError::InvalidUrl {
            url: raw.to_string(),
            error: e.to_string(),
        })
    }

    /// Get the base URL keys are resolved against
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, key: &RemoteKey) -> TransportResult<Bytes> {
        let url = self.resolve(key)?;
        self.http_handler.get_bytes(&url).await
    }
}
