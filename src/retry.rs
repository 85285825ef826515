//! HTTP fetching with bounded retry and linear backoff.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: Core trait for "give me the body at this URL"
//! - [`HttpFetcher`]: `reqwest` implementation with a timeout and desktop user agent
//! - [`RetryFetch`]: Decorator that retries any `FetchAsync` implementation
//!
//! # Retry Strategy
//!
//! - 3 attempts in total by default
//! - The n-th retry waits `n * step` (1s, 2s, ... with the default step)
//! - Exhausted retries surface as [`FetchError::Exhausted`]; callers log and move on

use crate::error::FetchError;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Trait for async body fetching.
///
/// Implementors download the body at a URL as text. Fakes implement it in
/// tests so no test touches the network.
pub trait FetchAsync {
    /// Fetch the body at `url`.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Wrapper that adds linear backoff retry to any [`FetchAsync`] implementation.
pub struct RetryFetch<T> {
    /// The underlying fetcher.
    inner: T,
    /// Total attempts, including the first.
    attempts: usize,
    /// Backoff step; the n-th retry sleeps `n * step`.
    step: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: FetchAsync,
{
    /// Wrap `inner` with retry.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to retry
    /// * `attempts` - Total attempts including the first; `0` is treated as `1`
    /// * `step` - Backoff step; the n-th retry sleeps `n * step`
    ///
    /// # Returns
    ///
    /// A fetcher that gives up with [`FetchError::Exhausted`] after `attempts` failures.
    pub fn new(inner: T, attempts: usize, step: StdDuration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            step,
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("attempts", &self.attempts)
            .field("step", &self.step)
            .finish()
    }
}

impl<T> FetchAsync for RetryFetch<T>
where
    T: FetchAsync,
{
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.inner.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    if attempt >= self.attempts {
                        error!(
                            attempt,
                            max = self.attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(FetchError::Exhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }

                    let delay = self.step.saturating_mul(attempt as u32);
                    warn!(
                        attempt,
                        max = self.attempts,
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// `reqwest`-backed fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: StdDuration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl FetchAsync for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let t0 = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody(url.to_string()));
        }
        debug!(
            %url,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched body"
        );
        Ok(body)
    }
}

impl<T: FetchAsync> FetchAsync for &T {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        (**self).fetch(url).await
    }
}
