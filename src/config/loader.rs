//! Settings resolution: defaults, config file, environment, flags.

use std::path::PathBuf;
use std::str::FromStr;

use super::{Config, ConfigError, Settings};

/// Prefix of environment variables that override settings.
pub const ENV_PREFIX: &str = "SI_";

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory from the command line.
    pub data_dir: Option<PathBuf>,
}

/// Load settings with explicit options.
///
/// An explicit config path that cannot be read is an error; a discovered
/// file that cannot be read is ignored with a warning.
pub async fn load_settings(options: &LoadOptions) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let base_dir = config.base_dir().unwrap_or_else(|| cwd.clone());
    config.apply_to_settings(&mut settings, &base_dir);

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.sanitize();

    if let Some(ref data_dir) = options.data_dir {
        settings.data_dir = if data_dir.is_absolute() {
            data_dir.clone()
        } else {
            cwd.join(data_dir)
        };
    }

    if let Some(ref path) = config.source_path {
        tracing::debug!("Loaded config from {}", path.display());
    }

    Ok((settings, config))
}

/// Apply `SI_*` overrides using `lookup` to read variables.
///
/// Values that fail to parse are ignored with a warning, and unusable
/// rate-limit values fall back to their defaults.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| -> Option<String> {
        lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.is_empty())
    };

    fn parsed<T: FromStr>(name: &str, raw: Option<String>) -> Option<T> {
        let raw = raw?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid {}{}={:?}", ENV_PREFIX, name, raw);
                None
            }
        }
    }

    macro_rules! string_env {
        ($($field:ident => $name:literal),* $(,)?) => {
            $(
                if let Some(value) = get($name) {
                    settings.$field = value;
                }
            )*
        };
    }

    macro_rules! parsed_env {
        ($($field:ident => $name:literal),* $(,)?) => {
            $(
                if let Some(value) = parsed($name, get($name)) {
                    settings.$field = value;
                }
            )*
        };
    }

    string_env!(
        base_url => "BASE_URL",
        publication_search_path => "PUBLICATION_SEARCH_PATH",
        press_releases_path => "PRESS_RELEASES_PATH",
        skolenkaten_path => "SKOLENKATEN_PATH",
        tillstand_path => "TILLSTAND_PATH",
        tillsyn_path => "TILLSYN_PATH",
        kolada_base_url => "KOLADA_BASE_URL",
        user_agent => "USER_AGENT",
        index_filename => "INDEX_FILENAME",
        latest_updated_filename => "LATEST_UPDATED_FILENAME",
    );

    parsed_env!(
        http_timeout => "HTTP_TIMEOUT",
        max_concurrent_requests => "MAX_CONCURRENT_REQUESTS",
        rate_limit_per_second => "RATE_LIMIT_PER_SECOND",
        rate_limit_burst => "RATE_LIMIT_BURST",
        max_retries => "MAX_RETRIES",
        retry_backoff_factor => "RETRY_BACKOFF_FACTOR",
        retry_initial_delay => "RETRY_INITIAL_DELAY",
        retry_max_delay => "RETRY_MAX_DELAY",
        breaker_failure_threshold => "BREAKER_FAILURE_THRESHOLD",
        breaker_success_threshold => "BREAKER_SUCCESS_THRESHOLD",
        breaker_timeout => "BREAKER_TIMEOUT",
        cache_ttl_hours => "CACHE_TTL_HOURS",
        cache_max_memory_items => "CACHE_MAX_MEMORY_ITEMS",
        max_pages_per_scrape => "MAX_PAGES_PER_SCRAPE",
        scrape_delay_seconds => "SCRAPE_DELAY_SECONDS",
    );

    if let Some(dir) = get("DATA_DIR") {
        settings.data_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
    }
    if let Some(dir) = get("CACHE_DIR") {
        settings.cache_dir = Some(PathBuf::from(shellexpand::tilde(&dir).as_ref()));
    }

    settings.sanitize();
}
