//! Configuration management using the prefer crate for file discovery.
//!
//! Precedence, lowest to highest: built-in defaults, the config file,
//! `SI_*` environment variables, then command line flags.

mod loader;
mod settings;

pub use loader::{apply_env_overrides, load_settings, LoadOptions, ENV_PREFIX};
pub use settings::{Settings, REFRESH_STATE_FILENAME, USER_AGENT};
pub(crate) use settings::secs;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Configuration file structure. Every field is optional; unset fields keep
/// the value from [`Settings::default`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_search_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub press_releases_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skolenkaten_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tillstand_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tillsyn_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kolada_base_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_per_second: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_burst: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_initial_delay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_max_delay: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_success_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker_timeout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_ttl_hours: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_max_memory_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages_per_scrape: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scrape_delay_seconds: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_updated_filename: Option<String>,

    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover a `sidata` config file in the standard locations.
    ///
    /// Returns the default (empty) config when nothing is found or the
    /// discovered file cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load("sidata").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config: {}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// The format follows the extension: TOML, YAML, otherwise JSON.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents).map_err(|e| parse_error("TOML", e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| parse_error("YAML", e.to_string()))?
            }
            _ => serde_json::from_str(&contents).map_err(|e| parse_error("JSON", e.to_string()))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Directory of the config file, used to resolve relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// `~` is expanded; absolute paths are returned as-is.
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(ref value) = self.$field {
                        settings.$field = value.clone();
                    }
                )*
            };
        }

        apply!(
            base_url,
            publication_search_path,
            press_releases_path,
            skolenkaten_path,
            tillstand_path,
            tillsyn_path,
            kolada_base_url,
            http_timeout,
            user_agent,
            max_concurrent_requests,
            rate_limit_per_second,
            rate_limit_burst,
            max_retries,
            retry_backoff_factor,
            retry_initial_delay,
            retry_max_delay,
            breaker_failure_threshold,
            breaker_success_threshold,
            breaker_timeout,
            cache_ttl_hours,
            cache_max_memory_items,
            max_pages_per_scrape,
            scrape_delay_seconds,
            index_filename,
            latest_updated_filename,
        );

        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref cache_dir) = self.cache_dir {
            settings.cache_dir = Some(self.resolve_path(cache_dir, base_dir));
        }
    }
}
