//! Stateful wrapper around the delta calculation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use super::{
    load_update_metadata, save_update_metadata, DeltaError, DeltaPolicy, DeltaResult,
    UpdateMetadata,
};
use crate::config::Settings;
use crate::utils::days_since;

/// Tracks saved item counts per source across runs.
///
/// ```ignore
/// let mut tracker = DeltaTracker::new(settings.latest_updated_path());
/// tracker.load().await;
/// let delta = tracker.calculate_delta("publications", 350);
/// // ... fetch delta.items_to_fetch items ...
/// tracker.record_update("publications", 350);
/// tracker.save().await?;
/// ```
#[derive(Debug, Clone)]
pub struct DeltaTracker {
    metadata_path: PathBuf,
    metadata: Option<UpdateMetadata>,
    policy: DeltaPolicy,
}

impl DeltaTracker {
    pub fn new(metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            metadata_path: metadata_path.into(),
            metadata: None,
            policy: DeltaPolicy::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.latest_updated_path())
    }

    pub fn with_policy(mut self, policy: DeltaPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    pub fn metadata(&self) -> Option<&UpdateMetadata> {
        self.metadata.as_ref()
    }

    /// Load metadata from disk, replacing anything held in memory.
    pub async fn load(&mut self) {
        self.metadata = load_update_metadata(&self.metadata_path).await;
    }

    /// Persist metadata. Does nothing if no update has been recorded.
    pub async fn save(&self) -> Result<(), DeltaError> {
        match self.metadata {
            Some(ref metadata) => save_update_metadata(metadata, &self.metadata_path).await,
            None => Ok(()),
        }
    }

    /// Fetch recommendation for `source` given its current remote count.
    pub fn calculate_delta(&self, source: &str, online_count: u64) -> DeltaResult {
        let result = match self.metadata {
            None => DeltaResult::full(
                online_count,
                "no previous metadata",
                i64::try_from(online_count).unwrap_or(i64::MAX),
                0,
            ),
            Some(ref metadata) => {
                let saved = metadata.items.get(source).copied().unwrap_or(0);
                self.policy
                    .evaluate(online_count, saved, days_since(metadata.latest_updated))
            }
        };
        info!("Delta for {}: {}", source, result.description());
        result
    }

    /// Record a new saved count for `source`. Call [`save`](Self::save) to persist.
    pub fn record_update(&mut self, source: &str, count: u64) {
        let now = Utc::now();
        let metadata = self
            .metadata
            .get_or_insert_with(|| UpdateMetadata::new(now));
        metadata.items.insert(source.to_string(), count);
        metadata.latest_updated = now;
    }

    /// Remember the URLs seen in the latest scrape.
    pub fn record_scraped_urls(&mut self, urls: Vec<String>) {
        let metadata = self
            .metadata
            .get_or_insert_with(|| UpdateMetadata::new(Utc::now()));
        metadata.last_scraped_urls = urls;
    }

    pub fn get_last_update(&self) -> Option<DateTime<Utc>> {
        self.metadata.as_ref().map(|m| m.latest_updated)
    }

    pub fn get_item_count(&self, source: &str) -> u64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.items.get(source).copied())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_no_metadata_forces_full_scrape() {
        let tracker = DeltaTracker::new("/nonexistent/latest_updated.json");
        let delta = tracker.calculate_delta("publications", 350);

        assert!(delta.is_full_scrape);
        assert_eq!(delta.items_to_fetch, 350);
        assert_eq!(delta.reason, "no previous metadata");
        assert_eq!(delta.days_since_update, 0);
    }

    #[test]
    fn test_uses_stored_counts() {
        let mut tracker = DeltaTracker::new("unused.json");
        tracker.record_update("publications", 100);

        let delta = tracker.calculate_delta("publications", 105);
        assert!(!delta.is_full_scrape);
        assert_eq!(delta.items_to_fetch, 15);
        assert_eq!(delta.new_items_estimate, 5);

        // Unknown source has no saved count
        let other = tracker.calculate_delta("press_releases", 20);
        assert!(other.reason.contains("initial"));
    }

    #[test]
    fn test_staleness_from_timestamp() {
        let mut metadata = UpdateMetadata::new(Utc::now() - Duration::days(40));
        metadata.items.insert("publications".into(), 100);
        let tracker = DeltaTracker {
            metadata_path: PathBuf::from("unused.json"),
            metadata: Some(metadata),
            policy: DeltaPolicy::default(),
        };

        let delta = tracker.calculate_delta("publications", 100);
        assert!(delta.is_full_scrape);
        assert_eq!(delta.days_since_update, 40);
    }

    #[tokio::test]
    async fn test_record_save_load_cycle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latest_updated.json");

        let mut tracker = DeltaTracker::new(&path);
        tracker.load().await;
        assert!(tracker.get_last_update().is_none());
        assert_eq!(tracker.get_item_count("publications"), 0);

        // Nothing recorded, nothing written
        tracker.save().await.unwrap();
        assert!(!path.exists());

        tracker.record_update("publications", 42);
        tracker.record_scraped_urls(vec!["https://example.com/p/1".into()]);
        tracker.save().await.unwrap();

        let mut reloaded = DeltaTracker::new(&path);
        reloaded.load().await;
        assert_eq!(reloaded.get_item_count("publications"), 42);
        assert!(reloaded.get_last_update().is_some());
        assert_eq!(
            reloaded.metadata().map(|m| m.last_scraped_urls.len()),
            Some(1)
        );
    }
}
