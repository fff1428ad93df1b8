//! Per-build event channels.
//!
//! Each in-flight build owns one ordered, unbounded event channel. The
//! supervisor opens it before the executor launches, so no event can fall
//! between launch and subscription; dropping the returned stream releases
//! the channel, after which late emits are dropped as stale.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::BuildEvent;
use crate::models::build::{ArtifactFormat, BuildOutcome};

type SenderMap = Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<BuildEvent>>>>;

#[derive(Debug, Default)]
pub struct BuildEventBus {
    senders: SenderMap,
}

impl BuildEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the event stream for a build. The returned handle is the only
    /// receiver; dropping it unregisters the build.
    pub fn register(&self, build_id: Uuid) -> BuildEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .write()
            .expect("event bus lock poisoned")
            .insert(build_id, tx);
        BuildEventStream {
            build_id,
            rx,
            senders: Arc::clone(&self.senders),
        }
    }

    /// Emits an event to a build's stream. Returns false when the build has
    /// no live stream and the event was dropped as stale.
    pub fn emit(&self, build_id: Uuid, event: BuildEvent) -> bool {
        let senders = self.senders.read().expect("event bus lock poisoned");
        match senders.get(&build_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn emit_log(&self, build_id: Uuid, line: impl Into<String>) -> bool {
        self.emit(build_id, BuildEvent::LogLine { line: line.into() })
    }

    pub fn emit_log_file(&self, build_id: Uuid, path: impl Into<String>) -> bool {
        self.emit(build_id, BuildEvent::LogFilePath { path: path.into() })
    }

    pub fn emit_artifact(
        &self,
        build_id: Uuid,
        path: impl Into<String>,
        format: ArtifactFormat,
    ) -> bool {
        self.emit(
            build_id,
            BuildEvent::ArtifactPath {
                path: path.into(),
                format,
            },
        )
    }

    pub fn emit_status(&self, build_id: Uuid, outcome: BuildOutcome) -> bool {
        self.emit(build_id, BuildEvent::Status { outcome })
    }
}

/// Receiving half of one build's event stream. Dropping it unregisters the
/// build from the bus on every exit path of its consumer.
pub struct BuildEventStream {
    build_id: Uuid,
    rx: mpsc::UnboundedReceiver<BuildEvent>,
    senders: SenderMap,
}

impl BuildEventStream {
    /// The next event in emission order.
    pub async fn next(&mut self) -> Option<BuildEvent> {
        self.rx.recv().await
    }

    pub fn build_id(&self) -> Uuid {
        self.build_id
    }
}

impl Drop for BuildEventStream {
    fn drop(&mut self) {
        self.senders
            .write()
            .expect("event bus lock poisoned")
            .remove(&self.build_id);
    }
}
