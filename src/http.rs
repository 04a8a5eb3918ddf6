//! HTTP fetching with retry, backoff, and response caching.
//!
//! The fetch seam is a small trait so every layer can be stacked as a
//! decorator:
//! - [`Fetch`]: core trait, one request in, one response out
//! - [`HttpFetcher`]: the live `reqwest` implementation
//! - [`RetryFetch`]: retries any [`Fetch`] with exponential backoff and jitter
//! - [`CachedFetch`]: serves GET requests from a [`ResponseCache`]
//!
//! # Retry Strategy
//!
//! - Fixed attempt budget (3 by default)
//! - Exponential backoff from a configurable base delay
//! - Maximum delay capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::cache::ResponseCache;
use crate::error::FetchError;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// How long fetched pages stay cached.
pub fn page_ttl() -> chrono::Duration {
    chrono::Duration::hours(1)
}

/// How long fetched images stay cached.
pub fn image_ttl() -> chrono::Duration {
    chrono::Duration::days(30)
}

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/png,image/svg+xml,*/*;q=0.8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Cache lifetime for GET responses; `None` bypasses the cache.
    pub cache_ttl: Option<chrono::Duration>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            body: None,
            cache_ttl: None,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: Vec::new(),
            body: Some(body.into()),
            cache_ttl: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cache_for(mut self, ttl: chrono::Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}

/// A successful response. Header names are stored lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedResponse {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait for async fetching.
///
/// Implementors either talk to the network or decorate another
/// implementation (retry, cache).
pub trait Fetch {
    /// Perform one request. Non-2xx responses are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError>;
}

/// Live HTTP client.
///
/// Sleeps `wait` before every request except the first, to stay polite
/// toward the scraped sites.
pub struct HttpFetcher {
    client: reqwest::Client,
    wait: StdDuration,
    sent: AtomicUsize,
}

impl HttpFetcher {
    pub fn new(
        user_agent: &str,
        wait: StdDuration,
        accept_invalid_certs: bool,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .timeout(StdDuration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            wait,
            sent: AtomicUsize::new(0),
        })
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("wait", &self.wait)
            .field("sent", &self.sent.load(Ordering::Relaxed))
            .finish()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        if self.sent.fetch_add(1, Ordering::SeqCst) > 0 && !self.wait.is_zero() {
            sleep(self.wait).await;
        }

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if !request.has_header("accept") {
            builder = builder.header(reqwest::header::ACCEPT, DEFAULT_ACCEPT);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let t0 = Instant::now();
        let response = builder.send().await.map_err(|source| FetchError::Request {
            url: request.url.clone(),
            source,
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: request.url.clone(),
                source,
            })?
            .to_vec();

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(FetchedResponse {
            url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// The delay between attempts follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    /// Total number of attempts, including the first one.
    attempts: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> RetryFetch<T> {
    /// Delay before the retry that follows failed attempt number `attempt`.
    fn backoff(&self, attempt: usize) -> StdDuration {
        let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("attempts", &self.attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip_all, fields(url = %request.url))]
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt >= self.attempts {
                        error!(
                            attempt,
                            max = self.attempts,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.attempts,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Serves GET requests that carry a `cache_ttl` from the response cache.
#[derive(Debug)]
pub struct CachedFetch<T> {
    inner: T,
    cache: ResponseCache,
}

impl<T> CachedFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, cache: ResponseCache) -> Self {
        Self { inner, cache }
    }
}

impl<T> Fetch for CachedFetch<T>
where
    T: Fetch,
{
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse, FetchError> {
        let ttl = match (request.method, request.cache_ttl) {
            (Method::Get, Some(ttl)) => ttl,
            _ => return self.inner.fetch(request).await,
        };
        if let Some(cached) = self.cache.get(&request.url).await {
            info!(url = %request.url, "Using cached response");
            return Ok(cached);
        }
        let response = self.inner.fetch(request).await?;
        self.cache.set(&request.url, &response, ttl).await;
        Ok(response)
    }
}

/// Settings shared by every live fetch in one run.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub wait: StdDuration,
    pub attempts: usize,
    pub backoff: StdDuration,
    pub accept_invalid_certs: bool,
}

/// The fetcher stack used by the binary: cache, then retry, then network.
pub type Fetcher = CachedFetch<RetryFetch<HttpFetcher>>;

pub fn build_fetcher(options: &FetchOptions, cache: ResponseCache) -> Result<Fetcher, reqwest::Error> {
    let http = HttpFetcher::new(
        &options.user_agent,
        options.wait,
        options.accept_invalid_certs,
    )?;
    let retrying = RetryFetch::new(http, options.attempts, options.backoff);
    Ok(CachedFetch::new(retrying, cache))
}
