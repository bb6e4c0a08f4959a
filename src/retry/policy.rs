//! Retry loop with backoff and optional circuit breaker.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::{calculate_delay, CircuitBreaker, RetryConfig};
use crate::http_client::FetchError;

/// Outcome of a single attempt, as seen by the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Success(T),
    /// Worth another try: transient error or retryable status.
    Retryable(FetchError),
    /// Give up immediately.
    Fatal(FetchError),
}

/// Retry policy: backoff configuration plus an optional breaker.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            breaker: None,
        }
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.breaker.as_ref()
    }

    /// Classify a plain result using the configured status and error sets.
    pub fn classify<T>(&self, result: Result<T, FetchError>) -> Attempt<T> {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) => {
                let retryable = match e.status() {
                    Some(status) => self.config.is_retryable_status(status),
                    None => self.config.is_retryable_kind(e.kind()),
                };
                if retryable {
                    Attempt::Retryable(e)
                } else {
                    Attempt::Fatal(e)
                }
            }
        }
    }

    /// Run `op` until it succeeds, fails fatally or runs out of attempts.
    ///
    /// The breaker is consulted once, before the first attempt. Transient
    /// errors count as a breaker failure on every attempt; a retryable
    /// status only counts once, when the attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        if let Some(ref breaker) = self.breaker {
            if !breaker.can_execute() {
                debug!("{} rejected: circuit '{}' open", operation, breaker.name());
                return Err(FetchError::CircuitOpen(breaker.name().to_string()));
            }
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            let outcome = op().await;
            attempts += 1;

            let error = match outcome {
                Attempt::Success(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Attempt::Fatal(e) => {
                    self.record_failure();
                    return Err(e);
                }
                Attempt::Retryable(e) => e,
            };

            let is_status = error.status().is_some();
            if !is_status {
                self.record_failure();
            }

            if attempts >= max_attempts {
                if is_status {
                    self.record_failure();
                }
                warn!(
                    "{} failed after {} attempts: {}",
                    operation, attempts, error
                );
                return Err(FetchError::MaxRetriesExceeded {
                    operation: operation.to_string(),
                    attempts,
                    source: Box::new(error),
                });
            }

            let delay = calculate_delay(attempts - 1, &self.config);
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:.2?}",
                operation, attempts, max_attempts, error, delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Run an operation returning a plain `Result`, classifying each outcome.
    pub async fn call<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let this = self;
        self.run(operation, || {
            let fut = op();
            async move { this.classify(fut.await) }
        })
        .await
    }

    fn record_success(&self) {
        if let Some(ref breaker) = self.breaker {
            breaker.record_success();
        }
    }

    fn record_failure(&self) {
        if let Some(ref breaker) = self.breaker {
            breaker.record_failure();
        }
    }
}

/// An operation bundled with the policy that guards it.
#[derive(Debug, Clone)]
pub struct Retrying<F> {
    policy: RetryPolicy,
    operation: String,
    op: F,
}

impl<F> Retrying<F> {
    /// Invoke the wrapped operation with `args`, retrying per the policy.
    pub async fn call<A, T, Fut>(&self, args: A) -> Result<T, FetchError>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        self.policy
            .call(&self.operation, || (self.op)(args.clone()))
            .await
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Wrap `op` so every call goes through `policy`.
pub fn with_retry<F>(policy: RetryPolicy, operation: impl Into<String>, op: F) -> Retrying<F> {
    Retrying {
        policy,
        operation: operation.into(),
        op,
    }
}

/// One-off retry of `op` with `config` and no breaker.
pub async fn retry_async<T, F, Fut>(
    operation: &str,
    config: RetryConfig,
    op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    RetryPolicy::new(config).call(operation, op).await
}
