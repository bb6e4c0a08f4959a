//! Refresh orchestration.
//!
//! [`DataRefresher`] runs registered [`SourceRoutine`]s one after another,
//! isolates each routine's failure (error or panic) to its own result, and
//! persists a summary of every run in `refresh_state.json`.

mod models;

pub use models::{
    HistoryEntry, RefreshResult, RefreshState, RefreshStatus, RefreshStatusReport,
    SourceRefreshResult, SourceState, MAX_HISTORY, MAX_SOURCE_ERRORS, STATUS_HISTORY,
};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::http_client::Fetcher;
use crate::sources::{KoladaSource, PublicationsSource, WorkbookSource};

/// Errors from the refresh orchestrator itself.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown source: {0}")]
    UnknownSource(String),
}

/// One refreshable data source.
#[async_trait]
pub trait SourceRoutine: Send + Sync {
    fn name(&self) -> &str;

    /// Refresh the source, recording counts and per-item errors in `result`.
    ///
    /// Returning an error marks the source failed; counts already recorded
    /// are kept.
    async fn refresh(&self, force: bool, result: &mut SourceRefreshResult) -> anyhow::Result<()>;
}

/// Runs source routines and keeps the refresh state file.
pub struct DataRefresher {
    state_path: PathBuf,
    state: RefreshState,
    routines: Vec<Box<dyn SourceRoutine>>,
}

impl DataRefresher {
    /// Create a refresher with no sources, loading any existing state.
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let state = load_state(&state_path);
        Self {
            state_path,
            state,
            routines: Vec::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.refresh_state_path())
    }

    /// Refresher with the five standard sources, in their default order.
    pub fn with_default_sources(settings: &Settings, fetcher: Arc<dyn Fetcher>) -> Self {
        Self::from_settings(settings)
            .with_source(PublicationsSource::new(settings, fetcher.clone()))
            .with_source(WorkbookSource::skolenkaten(settings, fetcher.clone()))
            .with_source(WorkbookSource::tillstand(settings, fetcher.clone()))
            .with_source(WorkbookSource::tillsyn(settings, fetcher.clone()))
            .with_source(KoladaSource::new(settings, fetcher))
    }

    pub fn with_source(mut self, routine: impl SourceRoutine + 'static) -> Self {
        self.register(Box::new(routine));
        self
    }

    /// Register a routine. A routine with the same name is replaced.
    pub fn register(&mut self, routine: Box<dyn SourceRoutine>) {
        match self.routines.iter().position(|r| r.name() == routine.name()) {
            Some(i) => self.routines[i] = routine,
            None => self.routines.push(routine),
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.routines.iter().map(|r| r.name()).collect()
    }

    pub fn state(&self) -> &RefreshState {
        &self.state
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn routine(&self, name: &str) -> Result<&dyn SourceRoutine, RefreshError> {
        self.routines
            .iter()
            .find(|r| r.name() == name)
            .map(|r| r.as_ref())
            .ok_or_else(|| RefreshError::UnknownSource(name.to_string()))
    }

    /// Refresh `sources` (all registered sources when `None`) in order.
    ///
    /// Source failures are recorded in the result, never propagated. The
    /// only error is failing to persist the refresh state.
    pub async fn refresh_all(
        &mut self,
        force: bool,
        sources: Option<&[String]>,
    ) -> Result<RefreshResult, RefreshError> {
        let started_at = Utc::now();
        let names: Vec<String> = match sources {
            Some(requested) => {
                let mut names: Vec<String> = Vec::with_capacity(requested.len());
                for name in requested {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
                names
            }
            None => self.routines.iter().map(|r| r.name().to_string()).collect(),
        };

        info!("Starting refresh of {} source(s): {}", names.len(), names.join(", "));

        let mut results = Vec::with_capacity(names.len());
        for name in &names {
            results.push(self.refresh_one(name, force).await);
        }

        let completed_at = Utc::now();
        let result = RefreshResult {
            success: !results.iter().any(|r| r.status == RefreshStatus::Failed),
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0,
            sources: results,
        };

        self.update_state(&result, sources.is_none());
        self.save_state().await?;

        info!(
            "Refresh finished in {:.1}s: {} items, {} errors, success={}",
            result.duration_seconds,
            result.total_items(),
            result.total_errors(),
            result.success
        );
        Ok(result)
    }

    async fn refresh_one(&self, name: &str, force: bool) -> SourceRefreshResult {
        let mut result = SourceRefreshResult::new(name);

        let routine = match self.routine(name) {
            Ok(routine) => routine,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                result.add_error(e.to_string());
                result.status = RefreshStatus::Skipped;
                return result;
            }
        };

        info!("Refreshing {}...", name);
        result.start();

        let outcome = AssertUnwindSafe(routine.refresh(force, &mut result))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                result.finish(RefreshStatus::Success);
                info!(
                    "{}: {} fetched, {} parsed, {} errors ({:.1}s)",
                    name,
                    result.items_fetched,
                    result.items_parsed,
                    result.error_count(),
                    result.duration_seconds
                );
            }
            Ok(Err(e)) => {
                error!("{} failed: {:#}", name, e);
                result.add_error(format!("{:#}", e));
                result.finish(RefreshStatus::Failed);
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("{} panicked: {}", name, message);
                result.add_error(format!("panic: {}", message));
                result.finish(RefreshStatus::Failed);
            }
        }
        result
    }

    fn update_state(&mut self, result: &RefreshResult, full: bool) {
        if full {
            self.state.last_full_refresh = Some(result.completed_at);
        } else {
            self.state.last_incremental_refresh = Some(result.completed_at);
        }

        for source in &result.sources {
            if source.status == RefreshStatus::Skipped {
                continue;
            }
            self.state.source_states.insert(
                source.source.clone(),
                SourceState {
                    last_refresh: source.completed_at.unwrap_or(result.completed_at),
                    status: source.status,
                    items: source.items_parsed,
                },
            );
        }

        self.state.push_history(HistoryEntry {
            timestamp: result.started_at,
            sources: result.sources.iter().map(|s| s.source.clone()).collect(),
            success: result.success,
            duration: result.duration_seconds,
        });
    }

    /// Write the state file, replacing it atomically.
    pub async fn save_state(&self) -> Result<(), RefreshError> {
        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        let tmp = self.state_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.state_path).await?;
        Ok(())
    }

    /// Current state as loaded or last written. No network access.
    pub fn get_status(&self) -> RefreshStatusReport {
        let history = &self.state.refresh_history;
        let recent = history.len().saturating_sub(STATUS_HISTORY);
        RefreshStatusReport {
            last_full_refresh: self.state.last_full_refresh,
            last_incremental_refresh: self.state.last_incremental_refresh,
            sources: self.state.source_states.clone(),
            recent_history: history[recent..].to_vec(),
        }
    }
}

fn load_state(path: &Path) -> RefreshState {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return RefreshState::default(),
        Err(e) => {
            warn!("Failed to read refresh state {}: {}", path.display(), e);
            return RefreshState::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(state) => state,
        Err(e) => {
            warn!("Ignoring invalid refresh state {}: {}", path.display(), e);
            RefreshState::default()
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use tempfile::TempDir;

    enum Behavior {
        Succeed(u64),
        PartialErrors,
        Fail,
        Panic,
    }

    struct FakeSource {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl SourceRoutine for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn refresh(&self, _force: bool, result: &mut SourceRefreshResult) -> anyhow::Result<()> {
            match self.behavior {
                Behavior::Succeed(n) => {
                    result.items_fetched = n;
                    result.items_parsed = n;
                    Ok(())
                }
                Behavior::PartialErrors => {
                    result.items_fetched = 3;
                    result.items_parsed = 2;
                    result.add_error("Parse error broken.xlsx: not a zip file");
                    Ok(())
                }
                Behavior::Fail => {
                    result.items_fetched = 1;
                    bail!("listing page unavailable")
                }
                Behavior::Panic => panic!("parser bug"),
            }
        }
    }

    fn refresher(dir: &TempDir) -> DataRefresher {
        DataRefresher::new(dir.path().join("refresh_state.json"))
            .with_source(FakeSource { name: "alpha", behavior: Behavior::Succeed(5) })
            .with_source(FakeSource { name: "beta", behavior: Behavior::Fail })
            .with_source(FakeSource { name: "gamma", behavior: Behavior::PartialErrors })
    }

    #[tokio::test]
    async fn test_one_failing_source_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        let mut refresher = refresher(&dir);

        let result = refresher.refresh_all(false, None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.count_with_status(RefreshStatus::Success), 2);
        assert_eq!(result.count_with_status(RefreshStatus::Failed), 1);

        let beta = result.source("beta").unwrap();
        assert_eq!(beta.items_fetched, 1);
        assert!(beta.errors[0].contains("listing page unavailable"));
        assert!(beta.completed_at.is_some());

        let gamma = result.source("gamma").unwrap();
        assert_eq!(gamma.status, RefreshStatus::Success);
        assert_eq!(gamma.errors.len(), 1);

        assert_eq!(result.total_items(), 7);
        assert_eq!(result.total_errors(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_failure() {
        let dir = TempDir::new().unwrap();
        let mut refresher = DataRefresher::new(dir.path().join("state.json"))
            .with_source(FakeSource { name: "alpha", behavior: Behavior::Panic })
            .with_source(FakeSource { name: "beta", behavior: Behavior::Succeed(1) });

        let result = refresher.refresh_all(false, None).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.sources[0].status, RefreshStatus::Failed);
        assert!(result.sources[0].errors[0].contains("parser bug"));
        assert_eq!(result.sources[1].status, RefreshStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_source_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut refresher = refresher(&dir);

        let requested = vec!["alpha".to_string(), "nope".to_string(), "alpha".to_string()];
        let result = refresher.refresh_all(false, Some(&requested)).await.unwrap();

        assert!(result.success);
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[1].status, RefreshStatus::Skipped);
        assert!(result.sources[1].errors[0].contains("unknown source"));
        assert!(!refresher.state().source_states.contains_key("nope"));
    }

    #[tokio::test]
    async fn test_state_tracks_full_and_incremental_runs() {
        let dir = TempDir::new().unwrap();
        let state_path = dir.path().join("refresh_state.json");
        let mut refresher = refresher(&dir);

        refresher.refresh_all(false, None).await.unwrap();
        assert!(refresher.state().last_full_refresh.is_some());
        assert!(refresher.state().last_incremental_refresh.is_none());

        let subset = vec!["alpha".to_string()];
        refresher.refresh_all(true, Some(&subset)).await.unwrap();
        assert!(refresher.state().last_incremental_refresh.is_some());

        // A fresh instance sees the persisted state
        let reloaded = DataRefresher::new(&state_path);
        let status = reloaded.get_status();
        assert_eq!(status.recent_history.len(), 2);
        assert_eq!(status.recent_history[1].sources, vec!["alpha".to_string()]);
        assert_eq!(status.sources["alpha"].items, 5);
        assert_eq!(status.sources["beta"].status, RefreshStatus::Failed);
        assert!(!status.recent_history[0].success);
    }

    #[tokio::test]
    async fn test_status_returns_ten_most_recent_runs() {
        let dir = TempDir::new().unwrap();
        let mut refresher = DataRefresher::new(dir.path().join("state.json"))
            .with_source(FakeSource { name: "alpha", behavior: Behavior::Succeed(1) });

        for _ in 0..12 {
            refresher.refresh_all(false, None).await.unwrap();
        }

        assert_eq!(refresher.state().refresh_history.len(), 12);
        assert_eq!(refresher.get_status().recent_history.len(), STATUS_HISTORY);
    }

    #[test]
    fn test_corrupt_state_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refresh_state.json");
        std::fs::write(&path, "{not json").unwrap();

        let refresher = DataRefresher::new(&path);
        assert_eq!(refresher.state(), &RefreshState::default());
    }
}
