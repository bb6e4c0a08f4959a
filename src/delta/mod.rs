//! Delta calculation for incremental updates.
//!
//! Compares the remote item count with what was saved last time and decides
//! whether an incremental fetch is enough or a full scrape is needed.

mod calculate;
mod merge;
mod metadata;
mod tracker;

pub use calculate::{
    calculate_items_to_fetch, DeltaPolicy, DeltaResult, FULL_SCRAPE_RATIO, STALE_AFTER_DAYS,
};
pub use merge::{filter_items_since, merge_items, Dated, Keyed};
pub use metadata::{load_update_metadata, save_update_metadata, UpdateMetadata, METADATA_VERSION};
pub use tracker::DeltaTracker;

use thiserror::Error;

/// Errors persisting delta metadata.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
