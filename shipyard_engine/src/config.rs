//! Engine configuration — loaded from environment variables.

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Default page size for build history queries.
    pub history_page_size: u32,
    /// Maximum log lines handed to display adapters.
    pub display_max_lines: usize,
    /// Quiet period for coalescing bursts of log updates.
    pub log_debounce_ms: u64,
    /// Path of the sqlite build history database.
    pub history_db_path: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let history_page_size = std::env::var("SHIPYARD_HISTORY_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.history_page_size);
        let display_max_lines = std::env::var("SHIPYARD_DISPLAY_MAX_LINES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.display_max_lines);
        let log_debounce_ms = std::env::var("SHIPYARD_LOG_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_debounce_ms);
        let history_db_path =
            std::env::var("SHIPYARD_HISTORY_DB").unwrap_or(defaults.history_db_path);

        Self {
            history_page_size,
            display_max_lines,
            log_debounce_ms,
            history_db_path,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_page_size: 20,
            display_max_lines: 100,
            log_debounce_ms: 500,
            history_db_path: "shipyard-history.db".to_string(),
        }
    }
}
