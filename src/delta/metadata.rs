//! Persisted record of the last successful update.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::DeltaError;
use crate::utils::time::flexible;

pub const METADATA_VERSION: &str = "1.0";

fn default_version() -> String {
    METADATA_VERSION.to_string()
}

/// Counts and timestamp of the last successful update, per source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMetadata {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(with = "flexible")]
    pub latest_updated: DateTime<Utc>,
    #[serde(default)]
    pub items: BTreeMap<String, u64>,
    #[serde(default)]
    pub last_scraped_urls: Vec<String>,
}

impl UpdateMetadata {
    pub fn new(latest_updated: DateTime<Utc>) -> Self {
        Self {
            version: default_version(),
            latest_updated,
            items: BTreeMap::new(),
            last_scraped_urls: Vec::new(),
        }
    }
}

/// Load metadata from `path`.
///
/// A missing, unreadable or malformed file yields `None`.
pub async fn load_update_metadata(path: &Path) -> Option<UpdateMetadata> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No previous update metadata at {}", path.display());
            return None;
        }
        Err(e) => {
            warn!("Failed to read metadata {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<UpdateMetadata>(&content) {
        Ok(metadata) => {
            debug!("Loaded metadata from {}", metadata.latest_updated);
            Some(metadata)
        }
        Err(e) => {
            warn!("Failed to load metadata {}: {}", path.display(), e);
            None
        }
    }
}

/// Save metadata to `path`, creating parent directories.
pub async fn save_update_metadata(metadata: &UpdateMetadata, path: &Path) -> Result<(), DeltaError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(metadata)?;
    tokio::fs::write(path, body).await?;
    info!("Saved update metadata to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("latest_updated.json");

        let mut metadata = UpdateMetadata::new(Utc::now());
        metadata.items.insert("publications".into(), 350);
        metadata.last_scraped_urls.push("https://example.com/a".into());

        save_update_metadata(&metadata, &path).await.unwrap();
        let loaded = load_update_metadata(&path).await.unwrap();

        assert_eq!(loaded.items.get("publications"), Some(&350));
        assert_eq!(loaded.last_scraped_urls.len(), 1);
        assert_eq!(loaded.version, "1.0");
        assert_eq!(
            loaded.latest_updated.timestamp(),
            metadata.latest_updated.timestamp()
        );
    }

    #[tokio::test]
    async fn test_missing_and_invalid_files() {
        let dir = TempDir::new().unwrap();
        assert!(load_update_metadata(&dir.path().join("none.json")).await.is_none());

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"items": {}}"#).unwrap();
        assert!(load_update_metadata(&bad).await.is_none());
    }

    #[tokio::test]
    async fn test_reads_naive_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latest_updated.json");
        std::fs::write(
            &path,
            r#"{"version": "1.0", "latest_updated": "2024-01-15T10:30:00.123456", "items": {"publications": 12}}"#,
        )
        .unwrap();

        let metadata = load_update_metadata(&path).await.unwrap();
        assert_eq!(metadata.items["publications"], 12);
        assert!(metadata.last_scraped_urls.is_empty());
    }
}
