//! Persistent disk tier: one JSON file per key.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::CacheError;

const ENTRY_EXTENSION: &str = "json";

/// Distinguishes temp files written concurrently by this process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Lowercase hex SHA-256 of a cache key.
pub fn cache_key_hash(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// On-disk representation of one entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEntry {
    key: String,
    value: Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Disk tier statistics.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiskStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub directory: PathBuf,
}

/// Disk cache rooted at a directory.
///
/// Expiry uses wall-clock time so entries survive restarts. Files that cannot
/// be read back are treated as missing and removed.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", cache_key_hash(key), ENTRY_EXTENSION))
    }

    /// Look up `key`, returning the value and its expiry.
    pub async fn get_with_expiry(
        &self,
        key: &str,
    ) -> Result<Option<(Value, DateTime<Utc>)>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: DiskEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Removing corrupt cache file {}: {}", path.display(), e);
                remove_quietly(&path).await;
                return Ok(None);
            }
        };

        if entry.key != key {
            return Ok(None);
        }
        if Utc::now() >= entry.expires_at {
            remove_quietly(&path).await;
            return Ok(None);
        }

        Ok(Some((entry.value, entry.expires_at)))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.get_with_expiry(key).await?.map(|(value, _)| value))
    }

    /// Write an entry. Concurrent writers of the same key: last rename wins.
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = DiskEntry {
            key: key.to_string(),
            value: value.clone(),
            created_at,
            expires_at,
        };
        let body = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            WRITE_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, body).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            remove_quietly(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry file, returning how many were removed.
    pub async fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for path in self.entry_files().await? {
            if tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove entries that are expired or unreadable.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut removed = 0;
        for path in self.entry_files().await? {
            let live = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<DiskEntry>(&bytes)
                    .map(|entry| now < entry.expires_at)
                    .unwrap_or(false),
                Err(_) => continue,
            };
            if !live && tokio::fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<DiskStats, CacheError> {
        let files = self.entry_files().await?;
        let mut total_bytes = 0;
        for path in &files {
            if let Ok(meta) = tokio::fs::metadata(path).await {
                total_bytes += meta.len();
            }
        }
        Ok(DiskStats {
            entries: files.len(),
            total_bytes,
            directory: self.dir.clone(),
        })
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

async fn remove_quietly(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
}
