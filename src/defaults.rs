//! Process-wide default rate limiter and content cache.
//!
//! Components take these as constructor arguments. The functions here hand
//! out one shared instance per process for callers that do not build their
//! own, and [`reset_defaults`] drops them so tests start clean.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::cache::ContentCache;
use crate::config::Settings;
use crate::rate_limit::RateLimiter;

static RATE_LIMITER: Mutex<Option<RateLimiter>> = Mutex::new(None);
static CONTENT_CACHE: Mutex<Option<Arc<ContentCache>>> = Mutex::new(None);

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The shared rate limiter, created from `settings` on first use.
pub fn rate_limiter(settings: &Settings) -> RateLimiter {
    lock(&RATE_LIMITER)
        .get_or_insert_with(|| {
            debug!(
                "Creating default rate limiter ({} req/s, burst {})",
                settings.rate_limit_per_second, settings.rate_limit_burst
            );
            RateLimiter::from_settings(settings)
        })
        .clone()
}

/// The shared content cache, created from `settings` on first use.
pub fn content_cache(settings: &Settings) -> Arc<ContentCache> {
    lock(&CONTENT_CACHE)
        .get_or_insert_with(|| {
            debug!(
                "Creating default content cache at {}",
                settings.effective_cache_dir().display()
            );
            Arc::new(ContentCache::from_settings(settings))
        })
        .clone()
}

/// Drop the shared instances. The next call creates fresh ones.
pub fn reset_defaults() {
    lock(&RATE_LIMITER).take();
    lock(&CONTENT_CACHE).take();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_defaults_are_shared_until_reset() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::with_data_dir(dir.path());
        reset_defaults();

        let first = content_cache(&settings);
        let second = content_cache(&settings);
        assert!(Arc::ptr_eq(&first, &second));

        let limiter = rate_limiter(&settings);
        limiter.acquire("example.com", 1).await;
        assert!(rate_limiter(&settings).get_status().contains_key("example.com"));

        reset_defaults();
        assert!(!Arc::ptr_eq(&first, &content_cache(&settings)));
        assert!(rate_limiter(&settings).get_status().is_empty());
        reset_defaults();
    }
}
