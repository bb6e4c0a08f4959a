//! Command implementations.
//!
//! Each command returns `Ok(true)` on success, `Ok(false)` when it ran but
//! the outcome should map to a failing exit code.

mod cache;
mod delta;
mod refresh;
mod status;

pub use cache::{cmd_cache_clear, cmd_cache_purge, cmd_cache_stats};
pub use delta::cmd_delta;
pub use refresh::cmd_refresh;
pub use status::cmd_status;
