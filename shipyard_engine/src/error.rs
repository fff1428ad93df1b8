//! Typed errors for the engine's public surface.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no active build for project: {0}")]
    NoActiveBuild(String),

    #[error("failed to abort build: {0}")]
    Abort(String),
}
