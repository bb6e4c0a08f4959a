//! Publication and press release listings, merged into `index.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::html::{extract_total_count, parse_press_releases, parse_publication_list};
use super::{fetch_listing, write_json_atomic};
use crate::config::Settings;
use crate::delta::{merge_items, DeltaTracker};
use crate::http_client::Fetcher;
use crate::models::Index;
use crate::refresh::{SourceRefreshResult, SourceRoutine};

/// Approximate number of publications per listing page.
pub const ITEMS_PER_PAGE: u64 = 20;

/// Scrapes the publication search and press release listings.
pub struct PublicationsSource {
    fetcher: Arc<dyn Fetcher>,
    base_url: String,
    search_url: String,
    press_url: String,
    index_path: PathBuf,
    metadata_path: PathBuf,
    max_pages: u32,
    page_delay: Duration,
}

impl PublicationsSource {
    pub const NAME: &'static str = "publications";

    pub fn new(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            base_url: settings.base_url.clone(),
            search_url: settings.publication_search_url(),
            press_url: settings.press_releases_url(),
            index_path: settings.index_path(),
            metadata_path: settings.latest_updated_path(),
            max_pages: settings.max_pages_per_scrape.max(1),
            page_delay: settings.scrape_delay(),
        }
    }

    fn page_url(&self, page: u32) -> String {
        format!("{}?p={}", self.search_url, page)
    }

    /// Pages to scrape for the announced total, given the tracker's history.
    fn pages_for(&self, tracker: &DeltaTracker, total: Option<u64>, force: bool) -> (u32, bool) {
        let Some(total) = total else {
            warn!("No result count on the first listing page, scraping up to {} pages", self.max_pages);
            return (self.max_pages, true);
        };
        if force {
            return (self.max_pages, true);
        }

        let delta = tracker.calculate_delta(Self::NAME, total);
        info!("Publications: {}", delta.description());
        if delta.is_full_scrape {
            return (self.max_pages, true);
        }
        let estimated = u32::try_from(delta.items_to_fetch / ITEMS_PER_PAGE + 1).unwrap_or(u32::MAX);
        (self.max_pages.min(estimated), false)
    }
}

async fn load_index(path: &Path) -> Index {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                warn!("Ignoring invalid index {}: {}", path.display(), e);
                Index::default()
            }
        },
        Err(_) => Index::default(),
    }
}

#[async_trait]
impl SourceRoutine for PublicationsSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn refresh(&self, force: bool, result: &mut SourceRefreshResult) -> anyhow::Result<()> {
        let mut tracker = DeltaTracker::new(&self.metadata_path);
        tracker.load().await;

        let first_url = self.page_url(1);
        let first_page = self
            .fetcher
            .fetch_text_uncached(&first_url)
            .await
            .with_context(|| format!("fetching {}", first_url))?;

        let (max_pages, full_scrape) = self.pages_for(&tracker, extract_total_count(&first_page), force);

        let mut scraped = parse_publication_list(&first_page, &self.base_url);
        let mut page = 2;
        while page <= max_pages && !scraped.is_empty() {
            tokio::time::sleep(self.page_delay).await;

            let url = self.page_url(page);
            let html = match fetch_listing(&*self.fetcher, &url, force).await {
                Ok(html) => html,
                Err(e) => {
                    result.add_error(format!("Page {}: {}", page, e));
                    break;
                }
            };
            let items = parse_publication_list(&html, &self.base_url);
            if items.is_empty() {
                break;
            }
            scraped.extend(items);
            page += 1;
        }
        info!("Scraped {} publications from {} page(s)", scraped.len(), page - 1);

        let press_releases = match fetch_listing(&*self.fetcher, &self.press_url, force).await {
            Ok(html) => parse_press_releases(&html, &self.base_url),
            Err(e) => {
                result.add_error(format!("Press releases: {}", e));
                Vec::new()
            }
        };

        result.items_fetched = (scraped.len() + press_releases.len()) as u64;
        let scraped_urls: Vec<String> = scraped.iter().map(|p| p.url.clone()).collect();

        let mut index = load_index(&self.index_path).await;
        if full_scrape && !scraped.is_empty() {
            // A full scrape is authoritative: drop publications no longer listed
            let (merged, _, updated) = merge_items(Vec::new(), scraped);
            info!("Publications: full scrape, {} kept ({} duplicates)", merged.len(), updated);
            index.publications = merged;
        } else {
            let existing = std::mem::take(&mut index.publications);
            let (merged, added, updated) = merge_items(existing, scraped);
            info!("Publications: {} added, {} updated", added, updated);
            index.publications = merged;
        }

        let existing = std::mem::take(&mut index.press_releases);
        let (merged, added, _) = merge_items(existing, press_releases);
        info!("Press releases: {} added", added);
        index.press_releases = merged;
        index.last_updated = Some(Utc::now().to_rfc3339());

        write_json_atomic(&self.index_path, &index)
            .await
            .with_context(|| format!("writing {}", self.index_path.display()))?;
        result.items_parsed = index.total_items() as u64;

        tracker.record_update(Self::NAME, index.publications.len() as u64);
        tracker.record_update("press_releases", index.press_releases.len() as u64);
        tracker.record_scraped_urls(scraped_urls);
        tracker.save().await.context("saving update metadata")?;

        Ok(())
    }
}
