//! Build lifecycle events.

pub mod bus;

pub use bus::{BuildEventBus, BuildEventStream};

use serde::{Deserialize, Serialize};

use crate::models::build::{ArtifactFormat, BuildOutcome};

/// Events an executor emits while a build runs.
///
/// Each build owns one stream, consumed in emission order; the variants are
/// the named channels of the executor interface (log-line, log-file-path,
/// artifact-path, status).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    /// One line of build output.
    LogLine { line: String },
    /// The executor streamed the full log to a sidecar file.
    LogFilePath { path: String },
    /// A build artifact was produced.
    ArtifactPath {
        path: String,
        format: ArtifactFormat,
    },
    /// Terminal result; always a build's last event.
    Status { outcome: BuildOutcome },
}
