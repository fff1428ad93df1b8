//! Build lifecycle orchestration.
//!
//! One supervisor serves all projects. `start_build` creates the in-flight
//! record, opens the build's event stream before the executor launches, and
//! spawns a routing task that applies events in emission order. Natural
//! completion, launch failure, and cancellation all converge on the single
//! finalize path; the event stream handle is released when the routing task
//! exits, on every path.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::EngineError;
use crate::events::bus::{BuildEventBus, BuildEventStream};
use crate::events::BuildEvent;
use crate::metrics;
use crate::models::build::{BuildOptions, BuildOutcome, BuildRecord, BuildStatus, Platform};
use crate::models::project::{NotificationSettings, Project};
use crate::services::executor::{BuildAborter, BuildExecutor};
use crate::services::history::HistoryStore;
use crate::services::notify::Notifier;
use crate::store::BuildStateStore;

pub struct BuildSupervisor {
    store: Arc<BuildStateStore>,
    bus: Arc<BuildEventBus>,
    executor: Arc<dyn BuildExecutor>,
    aborter: Arc<dyn BuildAborter>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<Notifier>,
}

impl BuildSupervisor {
    pub fn new(
        store: Arc<BuildStateStore>,
        bus: Arc<BuildEventBus>,
        executor: Arc<dyn BuildExecutor>,
        aborter: Arc<dyn BuildAborter>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        Self {
            store,
            bus,
            executor,
            aborter,
            history,
            notifier: Arc::new(Notifier::new()),
        }
    }

    pub fn store(&self) -> &Arc<BuildStateStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<BuildEventBus> {
        &self.bus
    }

    /// Starts a platform build and returns the new build id.
    ///
    /// Starting while the project already has a build in flight supersedes
    /// the prior build. Launch failure is not an error for the caller: the
    /// build still reaches history as `Failed` with the error in its logs.
    pub async fn start_build(
        &self,
        project: &Project,
        platform: Platform,
        options: BuildOptions,
    ) -> Uuid {
        let record = BuildRecord::new(project, platform, &options);
        let build_id = record.id;

        tracing::info!(
            build_id = %build_id,
            project_id = %project.id,
            platform = %platform,
            version = %record.version,
            "Build created"
        );
        metrics::build_status_changed(BuildStatus::Building.as_str());

        self.store.start_build(&project.id, record);

        // The stream must be open before the launch, so no event can fall
        // between process start and subscription.
        let stream = self.bus.register(build_id);
        let router = BuildRouter {
            store: Arc::clone(&self.store),
            history: Arc::clone(&self.history),
            notifier: Arc::clone(&self.notifier),
            ctx: BuildContext {
                build_id,
                project_id: project.id.clone(),
                project_name: project.name.clone(),
                notifications: project.notifications.clone(),
            },
        };
        tokio::spawn(router.run(stream));

        if let Err(e) = self.executor.launch(build_id, project, platform, &options).await {
            tracing::warn!(
                build_id = %build_id,
                project_id = %project.id,
                "Build launch failed: {e:#}"
            );
            self.bus.emit_log(build_id, format!("Error: {e:#}"));
            self.bus.emit_status(build_id, BuildOutcome::Failed);
        }

        build_id
    }

    /// Cancels a project's in-flight build. The abort collaborator stops
    /// the external process, whose terminal failure event then drives the
    /// normal finalize path; nothing is finalized here.
    pub async fn cancel_build(&self, project_id: &str) -> Result<(), EngineError> {
        let Some(active) = self.store.active_build(project_id) else {
            return Err(EngineError::NoActiveBuild(project_id.to_string()));
        };

        tracing::info!(build_id = %active.id, project_id = %project_id, "Cancelling build");
        self.bus.emit_log(active.id, "❌ Build cancelled by user");
        self.aborter
            .abort(active.id)
            .await
            .map_err(|e| EngineError::Abort(format!("{e:#}")))?;
        Ok(())
    }
}

/// Per-build context captured at start and carried by the routing task.
struct BuildContext {
    build_id: Uuid,
    project_id: String,
    project_name: String,
    notifications: Option<NotificationSettings>,
}

/// Applies one build's events to the store, in emission order, then
/// finalizes on the terminal event.
struct BuildRouter {
    store: Arc<BuildStateStore>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<Notifier>,
    ctx: BuildContext,
}

impl BuildRouter {
    async fn run(self, mut stream: BuildEventStream) {
        while let Some(event) = stream.next().await {
            match event {
                BuildEvent::LogLine { line } => {
                    let build_id = self.ctx.build_id;
                    self.store.update_build(&self.ctx.project_id, |mut record| {
                        if record.id == build_id {
                            record.logs.push_str(&line);
                            record.logs.push('\n');
                        }
                        record
                    });
                }
                BuildEvent::LogFilePath { path } => {
                    let build_id = self.ctx.build_id;
                    self.store.update_build(&self.ctx.project_id, |mut record| {
                        if record.id == build_id && record.log_file_path.is_none() {
                            record.log_file_path = Some(path);
                        }
                        record
                    });
                }
                BuildEvent::ArtifactPath { path, format } => {
                    let build_id = self.ctx.build_id;
                    self.store.update_build(&self.ctx.project_id, |mut record| {
                        if record.id == build_id {
                            record.artifact_path = Some(path);
                            record.format = Some(format);
                        }
                        record
                    });
                }
                BuildEvent::Status { outcome } => {
                    self.finalize(outcome.status()).await;
                    break;
                }
            }
        }
        // Dropping the stream releases the bus entry; anything emitted for
        // this build from now on is dropped as stale.
    }

    /// The one-time transition from in-flight to history. Idempotent: a
    /// build that was already finalized or superseded is left untouched.
    async fn finalize(&self, status: BuildStatus) {
        let Some(record) =
            self.store
                .complete_build(&self.ctx.project_id, self.ctx.build_id, status)
        else {
            tracing::debug!(
                build_id = %self.ctx.build_id,
                project_id = %self.ctx.project_id,
                "Stale terminal event ignored"
            );
            return;
        };

        metrics::build_status_changed(status.as_str());
        tracing::info!(
            build_id = %self.ctx.build_id,
            project_id = %self.ctx.project_id,
            status = status.as_str(),
            "Build finished"
        );

        self.store.add_to_history(record.clone());

        if let Err(e) = self.history.save(&record).await {
            metrics::history_save(false);
            tracing::warn!(
                build_id = %self.ctx.build_id,
                "Failed to persist build history: {e:#}"
            );
        } else {
            metrics::history_save(true);
        }

        if let Some(settings) = &self.ctx.notifications {
            self.notifier
                .build_finished(settings, &self.ctx.project_name, &record)
                .await;
        }
    }
}
