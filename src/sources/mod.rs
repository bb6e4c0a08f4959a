//! Refresh routines for each mirrored data source.
//!
//! - `publications`: search and press listings merged into `index.json`
//! - `workbook`: statistics workbooks (survey, permits, supervision)
//! - `kolada`: municipal education KPIs from the Kolada API

pub mod html;
mod kolada;
mod publications;
mod workbook;

pub use kolada::{KoladaSource, DEFAULT_MUNICIPALITIES, EDUCATION_KPIS};
pub use publications::{PublicationsSource, ITEMS_PER_PAGE};
pub use workbook::{SheetRowCounter, WorkbookParser, WorkbookSource};

use std::path::Path;

use serde::Serialize;

use crate::http_client::{FetchError, Fetcher};

/// Names of the standard sources, in default refresh order.
pub const DEFAULT_SOURCES: [&str; 5] = ["publications", "skolenkaten", "tillstand", "tillsyn", "kolada"];

/// Write `value` as pretty JSON, replacing `path` atomically.
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Fetch a listing page. Forced refreshes bypass the content cache so newly
/// linked items are seen immediately.
pub(crate) async fn fetch_listing(
    fetcher: &dyn Fetcher,
    url: &str,
    force: bool,
) -> Result<String, FetchError> {
    if force {
        fetcher.fetch_text_uncached(url).await
    } else {
        fetcher.fetch_text(url).await
    }
}
