//! Metrics for build orchestration observability.
//!
//! Thin wrappers over the `metrics` facade; the embedding application
//! decides which exporter, if any, to install.

use metrics::{counter, gauge, histogram};

/// Record a build state transition.
pub fn build_status_changed(status: &str) {
    counter!("shipyard_builds_total", "status" => status.to_string()).increment(1);
}

/// Record build duration.
pub fn build_duration(duration_ms: u64) {
    histogram!("shipyard_build_duration_ms").record(duration_ms as f64);
}

/// Set the current number of in-flight builds.
pub fn active_builds(count: usize) {
    gauge!("shipyard_active_builds").set(count as f64);
}

/// Record a history persistence outcome.
pub fn history_save(ok: bool) {
    let result = if ok { "ok" } else { "error" };
    counter!("shipyard_history_saves_total", "result" => result.to_string()).increment(1);
}
