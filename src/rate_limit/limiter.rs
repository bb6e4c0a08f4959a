//! Per-host rate limiter manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::TokenBucket;
use crate::config::Settings;

/// Host key used for relative or unparseable URLs.
pub const DEFAULT_HOST: &str = "default";

/// Snapshot of one bucket for status output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BucketStatus {
    pub available_tokens: f64,
    pub rate: f64,
    pub capacity: u32,
}

/// Proof that a rate-limit slot was granted for a host.
///
/// Nothing needs to happen when it is dropped; holding it for the duration
/// of the request just keeps the gate visible at the call site.
#[must_use = "the permit marks the start of a rate-limited request"]
#[derive(Debug)]
pub struct RatePermit {
    host: String,
    waited: Duration,
}

impl RatePermit {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Time spent waiting for the bucket.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

/// Rate limiter owning one token bucket per remote host.
///
/// Cloning shares the same buckets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    default_rate: f64,
    default_capacity: u32,
    buckets: Arc<Mutex<HashMap<String, Arc<TokenBucket>>>>,
}

impl RateLimiter {
    /// Create a limiter whose buckets default to `rate` requests/second with
    /// bursts of `capacity`.
    pub fn new(default_rate: f64, default_capacity: u32) -> Self {
        Self {
            default_rate,
            default_capacity,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create a limiter using the configured defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.rate_limit_per_second, settings.rate_limit_burst)
    }

    pub fn default_rate(&self) -> f64 {
        self.default_rate
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    /// Install a bucket with its own rate for `host`, replacing any existing one.
    pub fn configure_host(&self, host: &str, rate: f64, capacity: u32) {
        let mut buckets = self.lock_buckets();
        buckets.insert(
            host.to_string(),
            Arc::new(TokenBucket::new(host, rate, capacity)),
        );
    }

    /// Get or create the bucket for a host.
    ///
    /// Lookup and insertion happen under one lock so concurrent first
    /// requests for the same host always share a single bucket.
    fn bucket(&self, host: &str) -> Arc<TokenBucket> {
        let mut buckets = self.lock_buckets();
        buckets
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(
                    host,
                    self.default_rate,
                    self.default_capacity,
                ))
            })
            .clone()
    }

    /// Acquire `tokens` from the host's bucket, returning the time waited.
    pub async fn acquire(&self, host: &str, tokens: u32) -> Duration {
        let bucket = self.bucket(host);
        bucket.acquire(tokens).await
    }

    /// Wait for one slot on `host` and return a permit for the request.
    pub async fn limit(&self, host: &str) -> RatePermit {
        let waited = self.acquire(host, 1).await;
        RatePermit {
            host: host.to_string(),
            waited,
        }
    }

    /// Wait for one slot on the host of `url`.
    pub async fn limit_url(&self, url: &str) -> RatePermit {
        self.limit(&extract_domain(url)).await
    }

    /// Snapshot of every bucket created so far. Does not modify any bucket.
    pub fn get_status(&self) -> BTreeMap<String, BucketStatus> {
        let buckets = self.lock_buckets();
        buckets
            .iter()
            .map(|(host, bucket)| {
                (
                    host.clone(),
                    BucketStatus {
                        available_tokens: bucket.available_tokens(),
                        rate: bucket.rate(),
                        capacity: bucket.capacity(),
                    },
                )
            })
            .collect()
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<TokenBucket>>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Extract the rate-limit key (host, plus port when present) from a URL.
///
/// Relative paths and anything that is not http(s) map to [`DEFAULT_HOST`].
pub fn extract_domain(url: &str) -> String {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return DEFAULT_HOST.to_string();
    }

    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|host| match u.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            })
        })
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://www.skolinspektionen.se/beslut-rapporter/"),
            "www.skolinspektionen.se"
        );
        assert_eq!(
            extract_domain("https://api.kolada.se/v2/municipality?title=lund"),
            "api.kolada.se"
        );
        assert_eq!(extract_domain("http://localhost:8080/x"), "localhost:8080");
        assert_eq!(extract_domain("/globalassets/file.xlsx"), DEFAULT_HOST);
        assert_eq!(extract_domain("ftp://example.com/file"), DEFAULT_HOST);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buckets_are_per_host() {
        let limiter = RateLimiter::new(1.0, 1);

        let first = limiter.limit("a.example").await;
        assert_eq!(first.waited(), Duration::ZERO);
        assert_eq!(first.host(), "a.example");

        // Different host has its own full bucket
        let other = limiter.limit("b.example").await;
        assert_eq!(other.waited(), Duration::ZERO);

        // Same host must wait
        let second = limiter.limit("a.example").await;
        assert!(second.waited() > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_access_creates_one_bucket() {
        let limiter = RateLimiter::new(5.0, 2);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire("same.example", 1).await
            }));
        }
        let mut waited = Vec::new();
        for handle in handles {
            waited.push(handle.await.unwrap());
        }

        assert_eq!(limiter.get_status().len(), 1);
        // Only the burst of 2 goes through for free
        let free = waited.iter().filter(|w| w.is_zero()).count();
        assert_eq!(free, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot() {
        let limiter = RateLimiter::new(2.0, 5);
        assert!(limiter.get_status().is_empty());

        limiter.acquire("example.com", 3).await;
        let status = limiter.get_status();
        let bucket = status.get("example.com").unwrap();
        assert!((bucket.available_tokens - 2.0).abs() < 0.01);
        assert_eq!(bucket.rate, 2.0);
        assert_eq!(bucket.capacity, 5);

        // Reading again does not consume anything
        let again = limiter.get_status();
        assert!((again["example.com"].available_tokens - 2.0).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_host_override() {
        let limiter = RateLimiter::new(2.0, 5);
        limiter.configure_host("api.kolada.se", 10.0, 20);

        limiter.acquire("api.kolada.se", 1).await;
        let status = limiter.get_status();
        assert_eq!(status["api.kolada.se"].capacity, 20);
        assert_eq!(status["api.kolada.se"].rate, 10.0);
    }
}
