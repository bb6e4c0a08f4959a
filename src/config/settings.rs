//! Resolved application settings.

use std::path::PathBuf;
use std::time::Duration;

/// Default user agent sent with every request.
pub const USER_AGENT: &str =
    "SkolinspektionenData/0.1 (https://github.com/civictechsweden/skolinspektionen-data)";

/// Name of the cache directory created under the data directory.
const CACHE_SUBDIR: &str = ".cache";

/// Refresh state file name under the data directory.
pub const REFRESH_STATE_FILENAME: &str = "refresh_state.json";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the inspection authority website.
    pub base_url: String,
    /// Path of the publication search listing.
    pub publication_search_path: String,
    /// Path of the press release listing.
    pub press_releases_path: String,
    /// Listing page linking the survey workbooks.
    pub skolenkaten_path: String,
    /// Listing page linking the permit decision workbooks.
    pub tillstand_path: String,
    /// Listing page linking the supervision statistics workbooks.
    pub tillsyn_path: String,
    /// Base URL of the Kolada v2 API.
    pub kolada_base_url: String,

    /// Request timeout in seconds.
    pub http_timeout: f64,
    pub user_agent: String,
    /// Cap on simultaneous in-flight requests.
    pub max_concurrent_requests: usize,

    pub rate_limit_per_second: f64,
    pub rate_limit_burst: u32,

    pub max_retries: u32,
    pub retry_backoff_factor: f64,
    /// Delay before the first retry, in seconds.
    pub retry_initial_delay: f64,
    /// Upper bound on any single backoff delay, in seconds.
    pub retry_max_delay: f64,

    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    /// Seconds an open breaker waits before allowing a probe.
    pub breaker_timeout: f64,

    pub cache_ttl_hours: u64,
    pub cache_max_memory_items: usize,
    /// Explicit cache directory. `None` means `<data_dir>/.cache`.
    pub cache_dir: Option<PathBuf>,

    pub max_pages_per_scrape: u32,
    /// Pause between listing pages, in seconds.
    pub scrape_delay_seconds: f64,

    pub data_dir: PathBuf,
    pub index_filename: String,
    pub latest_updated_filename: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "https://www.skolinspektionen.se".to_string(),
            publication_search_path: "/beslut-rapporter/publikationssok/".to_string(),
            press_releases_path: "/om-oss/press/pressmeddelanden/".to_string(),
            skolenkaten_path: "/statistik/statistik-skolenkaten/".to_string(),
            tillstand_path: "/statistik/statistik-tillstand/".to_string(),
            tillsyn_path: "/statistik/statistik-tillsyn/".to_string(),
            kolada_base_url: "https://api.kolada.se/v2".to_string(),
            http_timeout: 30.0,
            user_agent: USER_AGENT.to_string(),
            max_concurrent_requests: 4,
            rate_limit_per_second: 2.0,
            rate_limit_burst: 5,
            max_retries: 3,
            retry_backoff_factor: 2.0,
            retry_initial_delay: 1.0,
            retry_max_delay: 60.0,
            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_timeout: 60.0,
            cache_ttl_hours: 24,
            cache_max_memory_items: 50,
            cache_dir: None,
            max_pages_per_scrape: 50,
            scrape_delay_seconds: 0.5,
            data_dir: PathBuf::from("data/api"),
            index_filename: "index.json".to_string(),
            latest_updated_filename: "latest_updated.json".to_string(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Join a site path onto the base URL.
    pub fn site_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn publication_search_url(&self) -> String {
        self.site_url(&self.publication_search_path)
    }

    pub fn press_releases_url(&self) -> String {
        self.site_url(&self.press_releases_path)
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_filename)
    }

    pub fn latest_updated_path(&self) -> PathBuf {
        self.data_dir.join(&self.latest_updated_filename)
    }

    pub fn refresh_state_path(&self) -> PathBuf {
        self.data_dir.join(REFRESH_STATE_FILENAME)
    }

    /// Cache directory, defaulting to `<data_dir>/.cache`.
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(CACHE_SUBDIR))
    }

    pub fn request_timeout(&self) -> Duration {
        secs(self.http_timeout)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    pub fn scrape_delay(&self) -> Duration {
        secs(self.scrape_delay_seconds)
    }

    /// Replace values the rate limiter cannot work with by their defaults.
    pub fn sanitize(&mut self) {
        let defaults = Settings::default();
        if !(self.rate_limit_per_second.is_finite() && self.rate_limit_per_second > 0.0) {
            tracing::warn!(
                "Invalid rate_limit_per_second {}, using {}",
                self.rate_limit_per_second,
                defaults.rate_limit_per_second
            );
            self.rate_limit_per_second = defaults.rate_limit_per_second;
        }
        if self.rate_limit_burst == 0 {
            tracing::warn!("rate_limit_burst must be at least 1, using {}", defaults.rate_limit_burst);
            self.rate_limit_burst = defaults.rate_limit_burst;
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

/// Convert a possibly negative or non-finite seconds value to a duration.
pub(crate) fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}
