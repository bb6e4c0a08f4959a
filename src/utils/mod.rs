//! Shared utility functions.
//!
//! - `time`: timestamp parsing and serde adapters for persisted state
//! - `text`: whitespace normalization and truncation for display

mod text;
pub mod time;

pub use text::{normalize_whitespace, truncate};
pub use time::{days_since, parse_timestamp};
