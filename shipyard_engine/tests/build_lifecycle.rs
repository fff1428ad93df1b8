//! End-to-end lifecycle scenarios driven through a scripted executor.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use shipyard_engine::events::{BuildEvent, BuildEventBus};
use shipyard_engine::services::executor::{BuildAborter, BuildExecutor};
use shipyard_engine::services::history::HistoryStore;
use shipyard_engine::services::supervisor::BuildSupervisor;
use shipyard_engine::{
    BuildOptions, BuildOutcome, BuildRecord, BuildStateStore, BuildStatus, EngineConfig,
    Platform, PlatformSettings, Project,
};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn test_project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: "Demo App".to_string(),
        path: "/tmp/demo".to_string(),
        ios: PlatformSettings {
            bundle_id: "com.demo.app".to_string(),
            version: "1.2.0".to_string(),
            build_number: 42,
            build_command: None,
        },
        android: PlatformSettings {
            bundle_id: "com.demo.app".to_string(),
            version: "1.1.9".to_string(),
            build_number: 37,
            build_command: None,
        },
        ios_config: None,
        notifications: None,
    }
}

/// Executor that replays a fixed script of events on launch. An empty
/// script models a build that never finishes on its own.
struct ScriptedExecutor {
    bus: Arc<BuildEventBus>,
    script: Vec<BuildEvent>,
    fail_launch: Option<String>,
}

#[async_trait]
impl BuildExecutor for ScriptedExecutor {
    async fn launch(
        &self,
        build_id: Uuid,
        _project: &Project,
        _platform: Platform,
        _options: &BuildOptions,
    ) -> anyhow::Result<()> {
        if let Some(message) = &self.fail_launch {
            anyhow::bail!("{message}");
        }
        for event in self.script.clone() {
            self.bus.emit(build_id, event);
        }
        Ok(())
    }
}

/// Aborter that behaves like a killed process: the build's stream receives
/// a failed status, nothing else.
struct KillSwitch {
    bus: Arc<BuildEventBus>,
}

#[async_trait]
impl BuildAborter for KillSwitch {
    async fn abort(&self, build_id: Uuid) -> anyhow::Result<()> {
        self.bus.emit_status(build_id, BuildOutcome::Failed);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryHistory {
    saved: Mutex<Vec<BuildRecord>>,
    fail_saves: bool,
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn save(&self, record: &BuildRecord) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("database is locked");
        }
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn list(
        &self,
        page: u32,
        page_size: u32,
        project_filter: Option<&str>,
    ) -> anyhow::Result<(Vec<BuildRecord>, u64)> {
        let saved = self.saved.lock().unwrap();
        let filtered: Vec<BuildRecord> = saved
            .iter()
            .rev()
            .filter(|record| project_filter.map_or(true, |p| record.project_id == p))
            .cloned()
            .collect();
        let total = filtered.len() as u64;
        let start = (page.saturating_sub(1) as usize) * page_size as usize;
        let items = filtered
            .into_iter()
            .skip(start)
            .take(page_size as usize)
            .collect();
        Ok((items, total))
    }
}

struct Harness {
    supervisor: Arc<BuildSupervisor>,
    store: Arc<BuildStateStore>,
    bus: Arc<BuildEventBus>,
    history: Arc<MemoryHistory>,
}

fn harness(script: Vec<BuildEvent>) -> Harness {
    harness_with(script, None, false)
}

fn harness_with(script: Vec<BuildEvent>, fail_launch: Option<&str>, fail_saves: bool) -> Harness {
    // Surfaces engine logs under RUST_LOG when a scenario needs debugging.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let bus = Arc::new(BuildEventBus::new());
    let history = Arc::new(MemoryHistory {
        saved: Mutex::new(Vec::new()),
        fail_saves,
    });
    let history_dyn: Arc<dyn HistoryStore> = history.clone();
    let store = Arc::new(BuildStateStore::new(
        history_dyn.clone(),
        &EngineConfig::default(),
    ));
    let executor = Arc::new(ScriptedExecutor {
        bus: bus.clone(),
        script,
        fail_launch: fail_launch.map(String::from),
    });
    let aborter = Arc::new(KillSwitch { bus: bus.clone() });
    let supervisor = Arc::new(BuildSupervisor::new(
        store.clone(),
        bus.clone(),
        executor,
        aborter,
        history_dyn,
    ));
    Harness {
        supervisor,
        store,
        bus,
        history,
    }
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn log(line: &str) -> BuildEvent {
    BuildEvent::LogLine {
        line: line.to_string(),
    }
}

fn status(outcome: BuildOutcome) -> BuildEvent {
    BuildEvent::Status { outcome }
}

#[tokio::test]
async fn completed_build_moves_to_history_with_full_logs() {
    let h = harness(vec![
        log("Compiling A"),
        log("Compiling B"),
        status(BuildOutcome::Success),
    ]);
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;

    let history = h.store.history();
    let record = &history[0];
    assert_eq!(record.project_id, "p1");
    assert_eq!(record.status, BuildStatus::Success);
    assert_eq!(record.version, "1.2.0");
    assert_eq!(
        record.logs,
        "Starting ios build for Demo App...\nCompiling A\nCompiling B\n"
    );
    assert!(!h.store.has_active_build("p1"));
    assert_eq!(h.history.saved.lock().unwrap().len(), 1);
    assert_eq!(h.store.page_info().total_items, 1);
}

#[tokio::test]
async fn launch_failure_still_produces_a_failed_history_entry() {
    let h = harness_with(Vec::new(), Some("disk full"), false);
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Android, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;

    let history = h.store.history();
    let record = &history[0];
    assert_eq!(record.status, BuildStatus::Failed);
    assert!(record.logs.contains("disk full"));
    assert!(!h.store.has_active_build("p1"));
    assert_eq!(h.history.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn second_start_supersedes_and_dead_letters_the_first() {
    let h = harness(Vec::new());
    let project = test_project("p1");

    let first = h
        .supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;
    let second = h
        .supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;

    assert_eq!(h.store.active_builds().len(), 1);
    assert_eq!(h.store.active_build("p1").unwrap().id, second);

    // Late events from the superseded build must not touch the new record
    // or produce a history entry.
    h.bus.emit_log(first, "late line");
    h.bus.emit_status(first, BuildOutcome::Success);
    wait_until(|| !h.bus.emit_log(first, "probe")).await;

    assert_eq!(h.store.history().len(), 0);
    let active = h.store.active_build("p1").unwrap();
    assert_eq!(active.id, second);
    assert!(!active.logs.contains("late line"));

    // The second build still finishes normally.
    h.bus.emit_log(second, "Compiling A");
    h.bus.emit_status(second, BuildOutcome::Success);
    wait_until(|| h.store.history().len() == 1).await;
    assert_eq!(h.store.history()[0].id, second);
}

#[tokio::test]
async fn duplicate_terminal_events_finalize_once() {
    let h = harness(vec![
        log("Compiling A"),
        status(BuildOutcome::Success),
        status(BuildOutcome::Failed),
    ]);
    let project = test_project("p1");

    let build_id = h
        .supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;
    // The stream is torn down after the first terminal event; give the
    // second one no way to resurrect anything.
    wait_until(|| !h.bus.emit_log(build_id, "probe")).await;

    assert_eq!(h.store.history().len(), 1);
    assert_eq!(h.store.history()[0].status, BuildStatus::Success);
    assert_eq!(h.history.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn log_file_path_is_set_once_and_kept() {
    let h = harness(vec![
        BuildEvent::LogFilePath {
            path: "/tmp/demo/ios/build/logs/1.log".to_string(),
        },
        BuildEvent::LogFilePath {
            path: "/tmp/demo/ios/build/logs/2.log".to_string(),
        },
        status(BuildOutcome::Success),
    ]);
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;
    assert_eq!(
        h.store.history()[0].log_file_path.as_deref(),
        Some("/tmp/demo/ios/build/logs/1.log")
    );
}

#[tokio::test]
async fn artifact_events_land_on_the_record() {
    let h = harness(vec![
        BuildEvent::ArtifactPath {
            path: "/tmp/demo/android/app-release.aab".to_string(),
            format: shipyard_engine::ArtifactFormat::Aab,
        },
        status(BuildOutcome::Success),
    ]);
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Android, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;
    let history = h.store.history();
    assert_eq!(
        history[0].artifact_path.as_deref(),
        Some("/tmp/demo/android/app-release.aab")
    );
    assert_eq!(history[0].format, Some(shipyard_engine::ArtifactFormat::Aab));
}

#[tokio::test]
async fn persistence_failure_keeps_the_in_memory_history() {
    let h = harness_with(
        vec![log("Compiling A"), status(BuildOutcome::Success)],
        None,
        true,
    );
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;

    wait_until(|| h.store.history().len() == 1).await;
    assert_eq!(h.store.history()[0].status, BuildStatus::Success);
    assert!(!h.store.has_active_build("p1"));
    assert!(h.history.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn cancel_drives_the_normal_finalize_path() {
    let h = harness(Vec::new());
    let project = test_project("p1");

    h.supervisor
        .start_build(&project, Platform::Ios, BuildOptions::default())
        .await;
    h.supervisor.cancel_build("p1").await.unwrap();

    wait_until(|| h.store.history().len() == 1).await;

    let history = h.store.history();
    assert_eq!(history[0].status, BuildStatus::Failed);
    assert!(history[0].logs.contains("Build cancelled by user"));
    assert!(!h.store.has_active_build("p1"));
}

#[tokio::test]
async fn cancel_without_an_active_build_is_a_typed_error() {
    let h = harness(Vec::new());
    let result = h.supervisor.cancel_build("ghost").await;
    assert!(matches!(
        result,
        Err(shipyard_engine::EngineError::NoActiveBuild(project)) if project == "ghost"
    ));
}

#[tokio::test]
async fn builds_for_different_projects_run_independently() {
    let h = harness(Vec::new());
    let p1 = test_project("p1");
    let p2 = test_project("p2");

    let b1 = h
        .supervisor
        .start_build(&p1, Platform::Ios, BuildOptions::default())
        .await;
    let b2 = h
        .supervisor
        .start_build(&p2, Platform::Android, BuildOptions::default())
        .await;

    assert_eq!(h.store.active_builds().len(), 2);

    h.bus.emit_log(b1, "from one");
    h.bus.emit_log(b2, "from two");
    h.bus.emit_status(b1, BuildOutcome::Failed);

    wait_until(|| h.store.history().len() == 1).await;
    assert!(h.store.has_active_build("p2"));
    assert!(!h.store.has_active_build("p1"));
    assert_eq!(h.store.history()[0].project_id, "p1");

    let p2_active = h.store.active_build("p2").unwrap();
    assert!(p2_active.logs.contains("from two"));
    assert!(!p2_active.logs.contains("from one"));

    h.bus.emit_status(b2, BuildOutcome::Success);
    wait_until(|| h.store.history().len() == 2).await;
}

#[tokio::test]
async fn release_note_is_captured_at_creation() {
    let h = harness(vec![status(BuildOutcome::Success)]);
    let project = test_project("p1");
    let options = BuildOptions {
        release_note: Some("first beta".to_string()),
        ..Default::default()
    };

    h.supervisor
        .start_build(&project, Platform::Ios, options)
        .await;

    wait_until(|| h.store.history().len() == 1).await;
    assert_eq!(h.store.history()[0].release_note, "first beta");
}

#[tokio::test]
async fn fetch_history_replaces_the_view_from_persistence() {
    let h = harness(Vec::new());
    let p1 = test_project("p1");
    let p2 = test_project("p2");

    for (project, platform) in [
        (&p1, Platform::Ios),
        (&p2, Platform::Android),
        (&p1, Platform::Android),
    ] {
        let build_id = h
            .supervisor
            .start_build(project, platform, BuildOptions::default())
            .await;
        h.bus.emit_status(build_id, BuildOutcome::Success);
        wait_until(|| !h.store.has_active_build(&project.id)).await;
    }
    wait_until(|| h.history.saved.lock().unwrap().len() == 3).await;

    h.store.fetch_history(Some(1), Some(2)).await;
    assert_eq!(h.store.history().len(), 2);
    assert_eq!(h.store.page_info().total_items, 3);
    assert_eq!(h.store.page_info().page_size, 2);

    h.store.filter_by_project(Some("p1".to_string())).await;
    assert_eq!(h.store.page_info().total_items, 2);
    assert!(h.store.history().iter().all(|r| r.project_id == "p1"));

    h.store.filter_by_project(None).await;
    assert_eq!(h.store.page_info().total_items, 3);
}
