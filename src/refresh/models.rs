//! Refresh outcome records and the persisted refresh state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::{flexible, flexible_opt};

/// Most history entries kept in the state file.
pub const MAX_HISTORY: usize = 100;

/// History entries returned by `get_status`.
pub const STATUS_HISTORY: usize = 10;

/// Errors kept per source; further errors are counted but dropped.
pub const MAX_SOURCE_ERRORS: usize = 50;

/// Lifecycle of one source within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for RefreshStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RefreshStatus::Pending => "pending",
            RefreshStatus::Running => "running",
            RefreshStatus::Success => "success",
            RefreshStatus::Failed => "failed",
            RefreshStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of refreshing a single source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRefreshResult {
    pub source: String,
    pub status: RefreshStatus,
    pub items_fetched: u64,
    pub items_parsed: u64,
    pub errors: Vec<String>,
    /// Errors beyond [`MAX_SOURCE_ERRORS`] that were not kept.
    #[serde(skip_serializing_if = "is_zero")]
    pub dropped_errors: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl SourceRefreshResult {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            status: RefreshStatus::Pending,
            items_fetched: 0,
            items_parsed: 0,
            errors: Vec::new(),
            dropped_errors: 0,
            started_at: None,
            completed_at: None,
            duration_seconds: 0.0,
        }
    }

    pub fn start(&mut self) {
        self.status = RefreshStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Move to a resting state and stamp completion time and duration.
    pub fn finish(&mut self, status: RefreshStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            self.duration_seconds = (now - started).num_milliseconds().max(0) as f64 / 1000.0;
        }
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        if self.errors.len() < MAX_SOURCE_ERRORS {
            self.errors.push(error.into());
        } else {
            self.dropped_errors += 1;
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len() + self.dropped_errors
    }
}

/// Outcome of a whole refresh run.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshResult {
    /// True when no source failed.
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Per-source results in execution order.
    pub sources: Vec<SourceRefreshResult>,
}

impl RefreshResult {
    pub fn source(&self, name: &str) -> Option<&SourceRefreshResult> {
        self.sources.iter().find(|s| s.source == name)
    }

    pub fn total_items(&self) -> u64 {
        self.sources.iter().map(|s| s.items_parsed).sum()
    }

    pub fn total_errors(&self) -> usize {
        self.sources.iter().map(|s| s.error_count()).sum()
    }

    pub fn count_with_status(&self, status: RefreshStatus) -> usize {
        self.sources.iter().filter(|s| s.status == status).count()
    }
}

/// Last known state of one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    #[serde(with = "flexible")]
    pub last_refresh: DateTime<Utc>,
    pub status: RefreshStatus,
    #[serde(default)]
    pub items: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(with = "flexible")]
    pub timestamp: DateTime<Utc>,
    pub sources: Vec<String>,
    pub success: bool,
    /// Run duration in seconds.
    pub duration: f64,
}

/// State persisted between runs in `refresh_state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshState {
    #[serde(default, with = "flexible_opt")]
    pub last_full_refresh: Option<DateTime<Utc>>,
    #[serde(default, with = "flexible_opt")]
    pub last_incremental_refresh: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_states: BTreeMap<String, SourceState>,
    #[serde(default)]
    pub refresh_history: Vec<HistoryEntry>,
}

impl RefreshState {
    /// Append a history entry, keeping only the most recent [`MAX_HISTORY`].
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.refresh_history.push(entry);
        if self.refresh_history.len() > MAX_HISTORY {
            let excess = self.refresh_history.len() - MAX_HISTORY;
            self.refresh_history.drain(..excess);
        }
    }
}

/// Read-only view returned by `DataRefresher::get_status`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatusReport {
    pub last_full_refresh: Option<DateTime<Utc>>,
    pub last_incremental_refresh: Option<DateTime<Utc>>,
    pub sources: BTreeMap<String, SourceState>,
    pub recent_history: Vec<HistoryEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RefreshStatus::Success).unwrap(), "success");
        assert_eq!(RefreshStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_errors_are_bounded() {
        let mut result = SourceRefreshResult::new("publications");
        for i in 0..(MAX_SOURCE_ERRORS + 5) {
            result.add_error(format!("error {}", i));
        }
        assert_eq!(result.errors.len(), MAX_SOURCE_ERRORS);
        assert_eq!(result.error_count(), MAX_SOURCE_ERRORS + 5);
    }

    #[test]
    fn test_history_ring_keeps_newest() {
        let mut state = RefreshState::default();
        for i in 0..(MAX_HISTORY + 3) {
            state.push_history(HistoryEntry {
                timestamp: Utc::now(),
                sources: vec![format!("s{}", i)],
                success: true,
                duration: 1.0,
            });
        }
        assert_eq!(state.refresh_history.len(), MAX_HISTORY);
        assert_eq!(state.refresh_history[0].sources, vec!["s3".to_string()]);
    }

    #[test]
    fn test_state_reads_naive_timestamps() {
        let state: RefreshState = serde_json::from_str(
            r#"{
                "last_full_refresh": "2024-11-02T10:15:00.123456",
                "last_incremental_refresh": null,
                "source_states": {
                    "kolada": {"last_refresh": "2024-11-02T10:16:00", "status": "success", "items": 10}
                },
                "refresh_history": []
            }"#,
        )
        .unwrap();

        assert!(state.last_full_refresh.is_some());
        assert!(state.last_incremental_refresh.is_none());
        assert_eq!(state.source_states["kolada"].items, 10);
        assert_eq!(state.source_states["kolada"].status, RefreshStatus::Success);
    }
}
