//! The single source of truth for build state.
//!
//! One in-flight record per project plus a paginated history view. The
//! store is an explicitly owned container: tests and embedding apps
//! instantiate as many isolated instances as they like. All mutation goes
//! through the methods here, serialized by the interior locks; observers
//! follow along through a watch-channel revision counter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::metrics;
use crate::models::build::{BuildRecord, BuildStatus};
use crate::services::history::HistoryStore;

/// Pagination state of the history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub current_page: u32,
    pub page_size: u32,
    pub total_items: u64,
}

struct HistoryView {
    entries: Vec<BuildRecord>,
    current_page: u32,
    page_size: u32,
    total_items: u64,
    project_filter: Option<String>,
}

pub struct BuildStateStore {
    active: RwLock<HashMap<String, BuildRecord>>,
    history_view: RwLock<HistoryView>,
    persistence: Arc<dyn HistoryStore>,
    revision: watch::Sender<u64>,
}

impl BuildStateStore {
    pub fn new(persistence: Arc<dyn HistoryStore>, config: &EngineConfig) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            active: RwLock::new(HashMap::new()),
            history_view: RwLock::new(HistoryView {
                entries: Vec::new(),
                current_page: 1,
                page_size: config.history_page_size,
                total_items: 0,
                project_filter: None,
            }),
            persistence,
            revision,
        }
    }

    /// Change notifications for display adapters: the revision bumps after
    /// every mutation; the value itself only orders notifications.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Inserts a new in-flight record, superseding any prior entry for the
    /// project. A project never has two in-flight builds.
    pub fn start_build(&self, project_id: &str, record: BuildRecord) {
        let mut active = self.active.write().expect("active build map lock poisoned");
        let build_id = record.id;
        if let Some(superseded) = active.insert(project_id.to_string(), record) {
            tracing::warn!(
                project_id = %project_id,
                superseded_build = %superseded.id,
                new_build = %build_id,
                "Superseding in-flight build"
            );
        }
        metrics::active_builds(active.len());
        drop(active);
        self.bump_revision();
    }

    /// Applies `updater` to the project's in-flight record, copy-on-write
    /// under the write lock. No-op when the project has no in-flight build;
    /// events that arrive after finalization land here harmlessly.
    pub fn update_build<F>(&self, project_id: &str, updater: F)
    where
        F: FnOnce(BuildRecord) -> BuildRecord,
    {
        let mut active = self.active.write().expect("active build map lock poisoned");
        let Some(current) = active.get(project_id).cloned() else {
            return;
        };
        active.insert(project_id.to_string(), updater(current));
        drop(active);
        self.bump_revision();
    }

    /// Atomically completes a build: removes the in-flight entry and returns
    /// it with the terminal status applied, but only when the entry is the
    /// expected build. Returns `None` when the build was already finalized
    /// or superseded, making duplicate terminal events no-ops.
    pub fn complete_build(
        &self,
        project_id: &str,
        build_id: Uuid,
        status: BuildStatus,
    ) -> Option<BuildRecord> {
        let mut active = self.active.write().expect("active build map lock poisoned");
        if active.get(project_id).map(|record| record.id) != Some(build_id) {
            return None;
        }
        let mut record = active.remove(project_id)?;

        let started_at = record.timestamp;
        record.status = status;
        record.timestamp = chrono::Utc::now();
        let duration = record.timestamp.signed_duration_since(started_at);
        metrics::build_duration(duration.num_milliseconds().max(0) as u64);
        metrics::active_builds(active.len());

        drop(active);
        self.bump_revision();
        Some(record)
    }

    /// Removes the project's in-flight entry unconditionally.
    pub fn clear_active(&self, project_id: &str) -> Option<BuildRecord> {
        let mut active = self.active.write().expect("active build map lock poisoned");
        let removed = active.remove(project_id);
        if removed.is_some() {
            metrics::active_builds(active.len());
            drop(active);
            self.bump_revision();
        }
        removed
    }

    /// Prepends a finalized record to the history view when it matches the
    /// active project filter. The total always advances, so pagination stays
    /// honest for filtered-out records.
    pub fn add_to_history(&self, record: BuildRecord) {
        let mut view = self.history_view.write().expect("history view lock poisoned");
        view.total_items += 1;
        let matches_filter = view
            .project_filter
            .as_deref()
            .map(|filter| filter == record.project_id)
            .unwrap_or(true);
        if matches_filter {
            view.entries.insert(0, record);
        }
        drop(view);
        self.bump_revision();
    }

    /// Loads one page from the persistence collaborator, replacing the
    /// history view. `None` arguments keep the current page/page size.
    /// Collaborator failure is logged and absorbed; the stale view stays.
    pub async fn fetch_history(&self, page: Option<u32>, page_size: Option<u32>) {
        let (page, page_size, filter) = {
            let view = self.history_view.read().expect("history view lock poisoned");
            (
                page.unwrap_or(view.current_page),
                page_size.unwrap_or(view.page_size),
                view.project_filter.clone(),
            )
        };

        match self.persistence.list(page, page_size, filter.as_deref()).await {
            Ok((entries, total_items)) => {
                let mut view = self.history_view.write().expect("history view lock poisoned");
                view.entries = entries;
                view.total_items = total_items;
                view.current_page = page;
                view.page_size = page_size;
                drop(view);
                self.bump_revision();
            }
            Err(e) => {
                tracing::error!("Failed to fetch build history: {e:#}");
            }
        }
    }

    /// Replaces the project filter and reloads the first page.
    pub async fn filter_by_project(&self, project: Option<String>) {
        {
            let mut view = self.history_view.write().expect("history view lock poisoned");
            view.project_filter = project;
            view.current_page = 1;
        }
        self.fetch_history(Some(1), None).await;
    }

    pub fn active_build(&self, project_id: &str) -> Option<BuildRecord> {
        self.active
            .read()
            .expect("active build map lock poisoned")
            .get(project_id)
            .cloned()
    }

    pub fn has_active_build(&self, project_id: &str) -> bool {
        self.active
            .read()
            .expect("active build map lock poisoned")
            .contains_key(project_id)
    }

    pub fn active_builds(&self) -> Vec<BuildRecord> {
        self.active
            .read()
            .expect("active build map lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Snapshot of the current history view, most recent first.
    pub fn history(&self) -> Vec<BuildRecord> {
        self.history_view
            .read()
            .expect("history view lock poisoned")
            .entries
            .clone()
    }

    pub fn page_info(&self) -> PageInfo {
        let view = self.history_view.read().expect("history view lock poisoned");
        PageInfo {
            current_page: view.current_page,
            page_size: view.page_size,
            total_items: view.total_items,
        }
    }

    pub fn project_filter(&self) -> Option<String> {
        self.history_view
            .read()
            .expect("history view lock poisoned")
            .project_filter
            .clone()
    }
}
