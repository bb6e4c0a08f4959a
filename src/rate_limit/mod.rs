//! Token-bucket rate limiting for outbound requests.
//!
//! Each remote host gets its own bucket, created lazily on first use.
//! Buckets only gate entry: once a permit is granted there is nothing to
//! release when the request completes.
//!
//! State is process-local. Two processes sharing a data directory each pace
//! themselves independently.

mod bucket;
mod limiter;

pub use bucket::{TokenBucket, MIN_RATE};
pub use limiter::{extract_domain, BucketStatus, RateLimiter, RatePermit, DEFAULT_HOST};
