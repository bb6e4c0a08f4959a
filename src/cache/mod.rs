//! Two-tier content cache: a bounded memory LRU in front of a disk store.
//!
//! Reads check memory, then disk; a disk hit is promoted into memory with
//! its remaining lifetime. Writes go to both tiers with the same TTL.

mod disk;
mod memory;

pub use disk::{cache_key_hash, DiskCache, DiskStats};
pub use memory::{LruCache, MemoryStats};

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;

/// Errors from the cache tiers.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Combined statistics for both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory: MemoryStats,
    pub disk: Option<DiskStats>,
}

/// Entries removed by [`ContentCache::clear`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ClearStats {
    pub memory: usize,
    pub disk: usize,
}

/// Memory + disk content cache.
pub struct ContentCache {
    memory: LruCache,
    disk: Option<DiskCache>,
    default_ttl: Duration,
}

impl ContentCache {
    /// Create a cache. Without a directory only the memory tier is used.
    pub fn new(disk_dir: Option<PathBuf>, memory_max_items: usize, default_ttl: Duration) -> Self {
        Self {
            memory: LruCache::new(memory_max_items, default_ttl),
            disk: disk_dir.map(DiskCache::new),
            default_ttl,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Some(settings.effective_cache_dir()),
            settings.cache_max_memory_items,
            settings.cache_ttl(),
        )
    }

    pub fn memory(&self) -> &LruCache {
        &self.memory
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get a value, checking memory first and then disk.
    ///
    /// Disk errors and values that do not deserialize as `T` read as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(value) = self.memory.get(key) {
            debug!("Cache hit (memory): {}", key);
            return decode(key, value);
        }

        let disk = self.disk.as_ref()?;
        match disk.get_with_expiry(key).await {
            Ok(Some((value, expires_at))) => {
                debug!("Cache hit (disk): {}", key);
                let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                if !remaining.is_zero() {
                    self.memory.set(key, value.clone(), Some(remaining));
                }
                decode(key, value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Disk cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Store a value in both tiers. `ttl` of `None` uses the default TTL.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let value = serde_json::to_value(value)?;

        if let Some(ref disk) = self.disk {
            disk.set(key, &value, ttl).await?;
        }
        self.memory.set(key, value, Some(ttl));
        Ok(())
    }

    /// Remove a key from both tiers. Returns whether either tier held it.
    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let in_memory = self.memory.delete(key);
        let on_disk = match self.disk {
            Some(ref disk) => disk.delete(key).await?,
            None => false,
        };
        Ok(in_memory || on_disk)
    }

    pub async fn clear(&self) -> Result<ClearStats, CacheError> {
        let memory = self.memory.clear();
        let disk = match self.disk {
            Some(ref disk) => disk.clear().await?,
            None => 0,
        };
        Ok(ClearStats { memory, disk })
    }

    /// Sweep expired files from the disk tier.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        match self.disk {
            Some(ref disk) => disk.purge_expired().await,
            None => Ok(0),
        }
    }

    pub async fn get_stats(&self) -> Result<CacheStats, CacheError> {
        let disk = match self.disk {
            Some(ref disk) => Some(disk.stats().await?),
            None => None,
        };
        Ok(CacheStats {
            memory: self.memory.stats(),
            disk,
        })
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("Cached value for {} has unexpected shape: {}", key, e);
            None
        }
    }
}
