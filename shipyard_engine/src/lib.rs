//! Shipyard engine — build lifecycle orchestration and live log streaming
//! for mobile release builds.
//!
//! A user triggers an iOS or Android build for a project; an external build
//! process streams log lines, a sidecar log path, and a terminal status
//! back asynchronously. The engine keeps the authoritative in-flight state
//! (at most one build per project), archives finished builds to a
//! paginated, project-filterable history, and prepares high-volume log
//! output for responsive display.
//!
//! The pieces compose around [`store::BuildStateStore`] (state),
//! [`events::BuildEventBus`] (one ordered event stream per build), and
//! [`services::supervisor::BuildSupervisor`] (lifecycle orchestration).
//! Display adapters read the store, coalesce its change notifications with
//! [`services::debounce`], and run logs through [`services::logs`] before
//! rendering.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shipyard_engine::events::BuildEventBus;
//! use shipyard_engine::services::executor::ProcessExecutor;
//! use shipyard_engine::services::history::{HistoryStore, SqliteHistoryStore};
//! use shipyard_engine::services::supervisor::BuildSupervisor;
//! use shipyard_engine::{BuildStateStore, EngineConfig};
//!
//! # async fn wire() -> anyhow::Result<()> {
//! let config = EngineConfig::from_env();
//! let bus = Arc::new(BuildEventBus::new());
//! let history: Arc<dyn HistoryStore> =
//!     Arc::new(SqliteHistoryStore::open(&config.history_db_path)?);
//! let store = Arc::new(BuildStateStore::new(history.clone(), &config));
//! let executor = Arc::new(ProcessExecutor::new(bus.clone()));
//! let supervisor = Arc::new(BuildSupervisor::new(
//!     store.clone(),
//!     bus,
//!     executor.clone(),
//!     executor,
//!     history,
//! ));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod services;
pub mod store;

pub use config::EngineConfig;
pub use error::EngineError;
pub use models::build::{
    ArtifactFormat, BuildOptions, BuildOutcome, BuildRecord, BuildStatus, Platform,
};
pub use models::project::{IosConfig, NotificationSettings, PlatformSettings, Project};
pub use store::{BuildStateStore, PageInfo};
