//! sidata - a local mirror of Skolinspektionen open data.
//!
//! Fetches publications, statistics workbooks and Kolada education KPIs
//! through a rate-limited, retrying, cached HTTP client, and keeps track of
//! what changed between refreshes.

pub mod cache;
pub mod cli;
pub mod config;
pub mod defaults;
pub mod delta;
pub mod http_client;
pub mod models;
pub mod rate_limit;
pub mod refresh;
pub mod retry;
pub mod sources;
pub mod utils;

pub use cache::ContentCache;
pub use config::Settings;
pub use delta::{calculate_items_to_fetch, DeltaResult, DeltaTracker};
pub use http_client::{FetchError, Fetcher, HttpClient};
pub use rate_limit::{RateLimiter, TokenBucket};
pub use refresh::{DataRefresher, RefreshResult, RefreshStatus, SourceRoutine};
pub use retry::{CircuitBreaker, CircuitState, RetryPolicy};
