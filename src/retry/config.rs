//! Retry configuration and backoff delay calculation.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;

use crate::config::{secs, Settings};
use crate::http_client::ErrorKind;

/// HTTP statuses worth retrying.
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Fraction of the delay used as the jitter range in each direction.
const JITTER_FRACTION: f64 = 0.25;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
    /// Randomize each delay by up to 25% in either direction.
    pub jitter: bool,
    pub retryable_status_codes: HashSet<u16>,
    pub retryable_error_kinds: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: true,
            retryable_status_codes: RETRYABLE_STATUS_CODES.into_iter().collect(),
            retryable_error_kinds: ErrorKind::TRANSIENT.into_iter().collect(),
        }
    }
}

impl RetryConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.max_retries.max(1),
            initial_delay: secs(settings.retry_initial_delay),
            backoff_factor: settings.retry_backoff_factor,
            max_delay: secs(settings.retry_max_delay),
            ..Default::default()
        }
    }

    /// Same configuration with jitter turned off.
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    pub fn is_retryable_kind(&self, kind: ErrorKind) -> bool {
        self.retryable_error_kinds.contains(&kind)
    }
}

/// Delay before the retry following attempt `attempt` (0-based).
///
/// `min(initial_delay * backoff_factor^attempt, max_delay)`, then optionally
/// shifted by a uniform jitter of up to 25%, never below zero.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * config.backoff_factor.powi(exponent);
    let mut delay = base.min(config.max_delay.as_secs_f64());

    if config.jitter && delay > 0.0 {
        let spread = delay * JITTER_FRACTION;
        delay += rand::rng().random_range(-spread..=spread);
    }

    secs(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_growth_without_jitter() {
        let config = RetryConfig::default().without_jitter();
        assert_eq!(calculate_delay(0, &config), Duration::from_secs(1));
        assert_eq!(calculate_delay(1, &config), Duration::from_secs(2));
        assert_eq!(calculate_delay(2, &config), Duration::from_secs(4));
        assert_eq!(calculate_delay(3, &config), Duration::from_secs(8));
    }

    #[test]
    fn test_delay_monotonic_and_capped() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..RetryConfig::default().without_jitter()
        };

        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = calculate_delay(attempt, &config);
            assert!(delay >= previous, "attempt {} went down", attempt);
            assert!(delay <= Duration::from_secs(10));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let config = RetryConfig::default();
        for _ in 0..200 {
            let delay = calculate_delay(2, &config).as_secs_f64();
            assert!((3.0..=5.0).contains(&delay), "delay {}", delay);
        }
    }

    #[test]
    fn test_default_retryable_sets() {
        let config = RetryConfig::default();
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(config.is_retryable_status(status));
        }
        assert!(!config.is_retryable_status(404));
        assert!(config.is_retryable_kind(ErrorKind::Timeout));
        assert!(!config.is_retryable_kind(ErrorKind::Decode));
    }

    #[test]
    fn test_from_settings() {
        let settings = Settings {
            max_retries: 5,
            retry_initial_delay: 0.5,
            retry_backoff_factor: 3.0,
            ..Default::default()
        };
        let config = RetryConfig::from_settings(&settings);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.backoff_factor, 3.0);
    }
}
