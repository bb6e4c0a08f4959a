//! HTTP client with caching, per-host rate limiting and retries.
//!
//! A request goes through, in order: the content cache, the concurrency
//! semaphore, the host's rate-limit bucket, and the retry policy guarded by
//! the host's circuit breaker. Only successful text bodies are cached.

mod error;
mod fetcher;

pub use error::{ErrorKind, FetchError};
pub use fetcher::Fetcher;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::cache::ContentCache;
use crate::config::Settings;
use crate::defaults;
use crate::rate_limit::RateLimiter;
use crate::retry::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    settings: Settings,
    rate_limiter: Option<RateLimiter>,
    cache: Option<Arc<ContentCache>>,
    retry: RetryConfig,
    breaker: CircuitBreakerConfig,
}

impl HttpClientBuilder {
    /// Share a rate limiter with other clients. Defaults to the process-wide limiter.
    pub fn rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Cache successful text responses.
    pub fn cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn breaker_config(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn build(self) -> Result<HttpClient, FetchError> {
        let client = Client::builder()
            .user_agent(&self.settings.user_agent)
            .timeout(self.settings.request_timeout())
            .gzip(true)
            .brotli(true)
            .build()?;

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| defaults::rate_limiter(&self.settings));

        Ok(HttpClient {
            client,
            rate_limiter,
            cache: self.cache,
            retry: self.retry,
            breaker_config: self.breaker,
            breakers: Arc::new(Mutex::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(self.settings.max_concurrent_requests.max(1))),
        })
    }
}

/// HTTP client shared by all source routines.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    cache: Option<Arc<ContentCache>>,
    retry: RetryConfig,
    breaker_config: CircuitBreakerConfig,
    breakers: Arc<Mutex<HashMap<String, Arc<CircuitBreaker>>>>,
    semaphore: Arc<Semaphore>,
}

impl HttpClient {
    pub fn builder(settings: &Settings) -> HttpClientBuilder {
        HttpClientBuilder {
            settings: settings.clone(),
            rate_limiter: None,
            cache: None,
            retry: RetryConfig::from_settings(settings),
            breaker: CircuitBreakerConfig::from_settings(settings),
        }
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn cache(&self) -> Option<&Arc<ContentCache>> {
        self.cache.as_ref()
    }

    /// Current state of every host breaker created so far.
    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut snapshots: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn breaker_for(&self, host: &str) -> Arc<CircuitBreaker> {
        let mut breakers = match self.breakers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        breakers
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(host, self.breaker_config.clone())))
            .clone()
    }

    /// GET `url` and read the body with `read`, under the full guard stack.
    async fn get_with<T, F, Fut>(&self, url: &str, read: F) -> Result<T, FetchError>
    where
        F: Fn(Response) -> Fut,
        Fut: Future<Output = Result<T, reqwest::Error>>,
    {
        let _slot = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::Other("HTTP client is shut down".to_string()))?;

        let permit = self.rate_limiter.limit_url(url).await;
        if permit.waited() > Duration::ZERO {
            debug!("Rate limited {} for {:.2?}", permit.host(), permit.waited());
        }

        let policy = RetryPolicy::new(self.retry.clone()).with_breaker(self.breaker_for(permit.host()));
        let client = &self.client;
        let read = &read;

        policy
            .call(url, move || async move {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status {
                        status: status.as_u16(),
                        url: url.to_string(),
                    });
                }
                Ok(read(response).await?)
            })
            .await
    }

    /// Fetch text, serving from and storing into the cache when one is configured.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        if let Some(ref cache) = self.cache {
            if let Some(text) = cache.get::<String>(url).await {
                debug!("Cache hit: {}", url);
                return Ok(text);
            }
        }

        let text = self.fetch_text_uncached(url).await?;

        if let Some(ref cache) = self.cache {
            if let Err(e) = cache.set(url, &text, None).await {
                warn!("Failed to cache {}: {}", url, e);
            }
        }
        Ok(text)
    }

    /// Fetch text without consulting or filling the cache.
    pub async fn fetch_text_uncached(&self, url: &str) -> Result<String, FetchError> {
        self.get_with(url, |response| response.text()).await
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.get_with(url, |response| async move {
            response.bytes().await.map(|b| b.to_vec())
        })
        .await
    }

    /// Fetch and deserialize a JSON document. Goes through the text cache.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let text = self.fetch_text(url).await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        HttpClient::fetch_text(self, url).await
    }

    async fn fetch_text_uncached(&self, url: &str) -> Result<String, FetchError> {
        HttpClient::fetch_text_uncached(self, url).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        HttpClient::fetch_bytes(self, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::CircuitState;

    // Nothing listens on the discard port, so connections are refused quickly.
    const DEAD_URL: &str = "http://127.0.0.1:9/page";

    fn client(cache: Option<Arc<ContentCache>>) -> HttpClient {
        let settings = Settings::default();
        let mut builder = HttpClient::builder(&settings)
            .rate_limiter(RateLimiter::new(100.0, 100))
            .retry_config(RetryConfig {
                max_attempts: 1,
                ..RetryConfig::default()
            })
            .breaker_config(CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            });
        if let Some(cache) = cache {
            builder = builder.cache(cache);
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_cached_text_skips_network() {
        let cache = Arc::new(ContentCache::new(None, 10, Duration::from_secs(60)));
        cache.set(DEAD_URL, "<html>cached</html>", None).await.unwrap();

        let client = client(Some(cache));
        let text = client.fetch_text(DEAD_URL).await.unwrap();
        assert_eq!(text, "<html>cached</html>");
        assert!(client.breaker_snapshots().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure_opens_host_breaker() {
        let client = client(None);

        let first = client.fetch_text(DEAD_URL).await.unwrap_err();
        assert_eq!(first.kind(), ErrorKind::RetriesExhausted);
        assert!(first.last_error().is_transient());

        let second = client.fetch_text(DEAD_URL).await.unwrap_err();
        assert!(matches!(second, FetchError::CircuitOpen(ref host) if host == "127.0.0.1:9"));

        let snapshots = client.breaker_snapshots();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].state, CircuitState::Open);
    }

    /// Serve `ok` after a short delay, tracking the peak number of
    /// requests in progress at once.
    async fn slow_server(peak: Arc<std::sync::atomic::AtomicUsize>) -> String {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let active = Arc::new(AtomicUsize::new(0));

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;

                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    active.fetch_sub(1, Ordering::SeqCst);

                    let _ = socket
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                        .await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_in_flight_requests_bounded_by_max_concurrent() {
        let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let base = slow_server(peak.clone()).await;

        let settings = Settings {
            max_concurrent_requests: 2,
            ..Settings::default()
        };
        let client = HttpClient::builder(&settings)
            .rate_limiter(RateLimiter::new(1000.0, 100))
            .build()
            .unwrap();

        let fetches = (0..6).map(|i| {
            let client = client.clone();
            let url = format!("{}/page/{}", base, i);
            async move { client.fetch_text_uncached(&url).await }
        });
        let bodies = futures::future::join_all(fetches).await;

        assert!(bodies.iter().all(|b| b.as_deref().ok() == Some("ok")));
        let peak = peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!(peak >= 1 && peak <= 2, "peak in-flight requests: {}", peak);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = Arc::new(ContentCache::new(None, 10, Duration::from_secs(60)));
        let client = client(Some(cache.clone()));

        assert!(client.fetch_text(DEAD_URL).await.is_err());
        assert!(cache.get::<String>(DEAD_URL).await.is_none());
    }
}
