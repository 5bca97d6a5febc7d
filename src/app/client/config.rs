//! HTTP transport configuration and client building

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{http, limits};
use crate::errors::{TransportError, TransportResult};

/// Configuration for the HTTP transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL that keys are resolved against
    pub base_url: String,
    /// Enable HTTP/2 adaptive window
    pub http2: bool,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// TCP nodelay (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Maximum number of idle connections per host
    pub pool_max_per_host: usize,
    /// Request timeout; an expired fetch surfaces as a failed outcome
    pub request_timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Rate limit (requests per second)
    pub rate_limit_rps: u32,
    /// Retries for 429/503/connection failures within one fetch
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: http::DEFAULT_BASE_URL.to_string(),
            http2: false,
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            tcp_nodelay: true,
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            pool_max_per_host: http::POOL_MAX_PER_HOST,
            request_timeout: http::DEFAULT_TIMEOUT,
            connect_timeout: http::CONNECT_TIMEOUT,
            rate_limit_rps: limits::DEFAULT_RATE_LIMIT_RPS,
            max_retries: limits::MAX_RETRIES,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for a base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set retry budget per fetch
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Parse the base URL, ensuring it ends in '/' so joins keep its path
    pub fn parse_base_url(&self) -> TransportResult<Url> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| TransportError::InvalidUrl {
            url: self.base_url.clone(),
            error: e.to_string(),
        })
    }

    /// Builds the HTTP client with the specified configuration
    pub fn build_http_client(&self) -> TransportResult<Client> {
        let mut client_builder = Client::builder()
            .timeout(self.request_timeout)
            .connect_timeout(self.connect_timeout)
            .user_agent(http::USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(http::MAX_REDIRECTS))
            .tcp_nodelay(self.tcp_nodelay)
            .pool_max_idle_per_host(self.pool_max_per_host);

        if self.http2 {
            client_builder = client_builder.http2_adaptive_window(true);
        }

        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(TransportError::Http)
    }
}
