//! The fetch seam consumed by source routines.

use async_trait::async_trait;

use super::FetchError;

/// Anything that can fetch remote content by URL.
///
/// [`HttpClient`](super::HttpClient) is the production implementation;
/// tests substitute a scripted fetcher.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a page as text, possibly served from cache.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;

    /// Fetch a page as text, bypassing any cache.
    async fn fetch_text_uncached(&self, url: &str) -> Result<String, FetchError> {
        self.fetch_text(url).await
    }

    /// Fetch a binary file. Never cached.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
