//! Core HTTP operations with rate limiting and bounded retries

use std::num::NonZeroU32;
use std::time::Duration;

use bytes::Bytes;
use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use url::Url;

use crate::constants::limits;
use crate::errors::{TransportError, TransportResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with resilience patterns
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
    max_retries: u32,
    request_timeout: Duration,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and limits
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if `rate_limit_rps` is zero
    pub fn new(
        client: Client,
        rate_limit_rps: u32,
        max_retries: u32,
        request_timeout: Duration,
    ) -> TransportResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
            max_retries,
            request_timeout,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> TransportResult<DirectRateLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps)
            .ok_or_else(|| TransportError::Other("Rate limit must be non-zero".to_string()))?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let delay = limits::RETRY_BASE_DELAY_MS.saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(limits::RETRY_MAX_DELAY_MS))
    }

    /// GET `url` and return the full body
    ///
    /// 429, 503 and connection failures are retried up to `max_retries`
    /// times with exponential backoff; any other non-success status fails
    /// immediately.
    pub async fn get_bytes(&self, url: &Url) -> TransportResult<Bytes> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(
                limits::JITTER_MAX_MS,
            )))
            .await;

        let mut retries = 0;
        loop {
            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        if retries < self.max_retries {
                            retries += 1;
                            let delay = Self::backoff_delay(retries);
                            tracing::warn!(
                                "Server responded {} for {}. Backing off for {}ms",
                                status.as_u16(),
                                url,
                                delay.as_millis()
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                            TransportError::RateLimitExceeded
                        } else {
                            TransportError::ServerOverloaded
                        });
                    }

                    if !status.is_success() {
                        return Err(TransportError::ServerError {
                            status: status.as_u16(),
                        });
                    }

                    let body = response.bytes().await.map_err(|e| {
                        if e.is_timeout() {
                            self.timeout_error()
                        } else {
                            TransportError::Body {
                                reason: e.to_string(),
                            }
                        }
                    })?;
                    tracing::debug!("Fetched {} bytes from {}", body.len(), url);
                    return Ok(body);
                }
                Err(e) if e.is_timeout() => return Err(self.timeout_error()),
                Err(e) if retries < self.max_retries => {
                    retries += 1;
                    let delay = Self::backoff_delay(retries);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        retries,
                        self.max_retries,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if self.max_retries == 0 => return Err(TransportError::Http(e)),
                Err(e) => {
                    tracing::error!("Request failed after {} retries: {}", self.max_retries, e);
                    return Err(TransportError::MaxRetriesExceeded {
                        max_retries: self.max_retries,
                    });
                }
            }
        }
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            seconds: self.request_timeout.as_secs(),
        }
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
