//! Retry with exponential backoff and circuit breaking.
//!
//! [`RetryPolicy`] wraps any async operation. Each attempt is classified as
//! an [`Attempt`]: success, retryable failure, or fatal failure. An attached
//! [`CircuitBreaker`] short-circuits calls to an endpoint that keeps failing.

mod breaker;
mod config;
mod policy;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{calculate_delay, RetryConfig, RETRYABLE_STATUS_CODES};
pub use policy::{retry_async, with_retry, Attempt, RetryPolicy, Retrying};
