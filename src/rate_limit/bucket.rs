//! Single-resource token bucket.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Slowest refill accepted, in tokens per second. Lower or invalid rates
/// are raised to this.
pub const MIN_RATE: f64 = 0.001;

/// Mutable balance of a bucket.
#[derive(Debug)]
struct Balance {
    tokens: f64,
    last_update: Instant,
}

impl Balance {
    /// Tokens the bucket would hold at `now`, without touching the balance.
    fn projected(&self, now: Instant, rate: f64, capacity: f64) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * rate).min(capacity)
    }

    fn refill(&mut self, rate: f64, capacity: f64) {
        let now = Instant::now();
        self.tokens = self.projected(now, rate, capacity);
        self.last_update = now;
    }
}

/// Token bucket allowing bursts up to `capacity` while holding the long-run
/// average to `rate` tokens per second.
///
/// Tokens refill continuously and are computed lazily from elapsed time on
/// every access. Concurrent acquirers queue on a turnstile so a waiter keeps
/// its place while it sleeps off a deficit; the balance itself sits behind a
/// short synchronous lock so status reads never wait on a sleeping acquirer.
///
/// Requesting more tokens than `capacity` in one call is a caller error: the
/// request can never be covered by a full bucket and the call will keep
/// sleeping in proportion to the rate.
#[derive(Debug)]
pub struct TokenBucket {
    name: String,
    rate: f64,
    capacity: u32,
    turnstile: tokio::sync::Mutex<()>,
    balance: Mutex<Balance>,
}

impl TokenBucket {
    /// Create a full bucket. A rate below [`MIN_RATE`] (zero, negative or
    /// not finite) is raised to [`MIN_RATE`].
    pub fn new(name: impl Into<String>, rate: f64, capacity: u32) -> Self {
        let name = name.into();
        let rate = if rate.is_finite() && rate >= MIN_RATE {
            rate
        } else {
            warn!("Rate limiter '{}': invalid rate {}, using {}", name, rate, MIN_RATE);
            MIN_RATE
        };
        Self {
            name,
            rate,
            capacity,
            turnstile: tokio::sync::Mutex::new(()),
            balance: Mutex::new(Balance {
                tokens: f64::from(capacity),
                last_update: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Wait until `tokens` are available, then debit them.
    ///
    /// Returns how long the caller had to wait (zero when the bucket already
    /// held enough tokens).
    pub async fn acquire(&self, tokens: u32) -> Duration {
        let _turn = self.turnstile.lock().await;
        let needed = f64::from(tokens);
        let capacity = f64::from(self.capacity);

        let deficit = {
            let mut balance = self.lock_balance();
            balance.refill(self.rate, capacity);
            if balance.tokens >= needed {
                balance.tokens -= needed;
                return Duration::ZERO;
            }
            needed - balance.tokens
        };

        let wait = Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(Duration::MAX);
        debug!("Rate limiter '{}': waiting {:.2?}", self.name, wait);
        tokio::time::sleep(wait).await;

        let mut balance = self.lock_balance();
        balance.refill(self.rate, capacity);
        // Float rounding can leave the balance a hair short of `needed`.
        balance.tokens = (balance.tokens - needed).max(0.0);
        wait
    }

    /// Current balance as a read-only projection of the refill formula.
    pub fn available_tokens(&self) -> f64 {
        let balance = self.lock_balance();
        balance.projected(Instant::now(), self.rate, f64::from(self.capacity))
    }

    fn lock_balance(&self) -> std::sync::MutexGuard<'_, Balance> {
        self.balance.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_capacity_acquires_are_free() {
        let bucket = TokenBucket::new("test", 1.0, 5);

        for _ in 0..5 {
            assert_eq!(bucket.acquire(1).await, Duration::ZERO);
        }

        let wait = bucket.acquire(1).await;
        assert!(wait > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_wait() {
        let bucket = TokenBucket::new("test", 2.0, 5);
        for _ in 0..5 {
            bucket.acquire(1).await;
        }
        assert!(bucket.available_tokens() < 0.01);

        tokio::time::advance(Duration::from_secs(2)).await;
        let available = bucket.available_tokens();
        assert!((available - 4.0).abs() < 0.01, "got {}", available);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!((bucket.available_tokens() - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deficit_wait_matches_rate() {
        let bucket = TokenBucket::new("test", 4.0, 2);
        bucket.acquire(2).await;

        let wait = bucket.acquire(2).await;
        assert_eq!(wait, Duration::from_millis(500));
        assert!(bucket.available_tokens() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquirers_never_overdraw() {
        let bucket = std::sync::Arc::new(TokenBucket::new("test", 10.0, 3));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move { bucket.acquire(1).await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // 3 free, 5 paid at 10/s
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(490), "elapsed {:?}", elapsed);
        assert!(bucket.available_tokens() >= 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_rate_is_raised_to_minimum() {
        for rate in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let bucket = TokenBucket::new("test", rate, 1);
            assert_eq!(bucket.rate(), MIN_RATE);

            assert_eq!(bucket.acquire(1).await, Duration::ZERO);
            let wait = bucket.acquire(1).await;
            assert_eq!(wait, Duration::from_secs_f64(1.0 / MIN_RATE));
        }
    }

    #[test]
    fn test_status_read_does_not_mutate() {
        let bucket = TokenBucket::new("test", 1.0, 3);
        assert_eq!(bucket.available_tokens(), 3.0);
        assert_eq!(bucket.available_tokens(), 3.0);
        assert_eq!(bucket.capacity(), 3);
        assert_eq!(bucket.rate(), 1.0);
    }
}
