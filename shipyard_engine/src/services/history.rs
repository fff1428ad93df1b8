//! Build history persistence.
//!
//! History entries are immutable once written: finalized records are
//! inserted exactly once and only ever read back.

use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::models::build::BuildRecord;

/// Persistence collaborator for finalized builds.
///
/// `save` failures are non-fatal to the in-memory lifecycle: the session's
/// history view stays authoritative. `list` failures surface to the store,
/// which logs and absorbs them.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Durably saves one finalized record.
    async fn save(&self, record: &BuildRecord) -> anyhow::Result<()>;

    /// One page of history, most recent first, plus the total row count for
    /// the given filter.
    async fn list(
        &self,
        page: u32,
        page_size: u32,
        project_filter: Option<&str>,
    ) -> anyhow::Result<(Vec<BuildRecord>, u64)>;
}

/// Sqlite-backed history store. The connection sits behind a mutex; build
/// finalization is far too infrequent for contention to matter.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path).context("open history database")?;
        Self::init(conn)
    }

    /// In-memory database for tests and ephemeral sessions.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> anyhow::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS build_history (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                version TEXT NOT NULL,
                build_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                logs TEXT,
                log_file_path TEXT,
                release_note TEXT,
                artifact_path TEXT,
                format TEXT
            )",
            [],
        )
        .context("create build_history table")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("history connection lock poisoned"))
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn save(&self, record: &BuildRecord) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO build_history (id, project_id, platform, version, build_number,
                                        status, timestamp, logs, log_file_path,
                                        release_note, artifact_path, format)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                record.id.to_string(),
                record.project_id,
                record.platform.as_str(),
                record.version,
                record.build_number,
                record.status.as_str(),
                record.timestamp.timestamp_millis(),
                record.logs,
                record.log_file_path,
                record.release_note,
                record.artifact_path,
                record.format.map(|f| f.as_str()),
            ],
        )
        .context("insert build history row")?;
        Ok(())
    }

    async fn list(
        &self,
        page: u32,
        page_size: u32,
        project_filter: Option<&str>,
    ) -> anyhow::Result<(Vec<BuildRecord>, u64)> {
        let conn = self.lock()?;
        let offset = page.saturating_sub(1).saturating_mul(page_size);

        let (total, raw_rows) = match project_filter {
            Some(project_id) => {
                let total: u64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM build_history WHERE project_id = ?1",
                        params![project_id],
                        |row| row.get(0),
                    )
                    .context("count build history rows")?;
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, platform, version, build_number, status,
                            timestamp, logs, log_file_path, release_note, artifact_path, format
                     FROM build_history
                     WHERE project_id = ?1
                     ORDER BY timestamp DESC
                     LIMIT ?2 OFFSET ?3",
                )?;
                let rows = stmt
                    .query_map(params![project_id, page_size, offset], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .context("read build history rows")?;
                (total, rows)
            }
            None => {
                let total: u64 = conn
                    .query_row("SELECT COUNT(*) FROM build_history", [], |row| row.get(0))
                    .context("count build history rows")?;
                let mut stmt = conn.prepare(
                    "SELECT id, project_id, platform, version, build_number, status,
                            timestamp, logs, log_file_path, release_note, artifact_path, format
                     FROM build_history
                     ORDER BY timestamp DESC
                     LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt
                    .query_map(params![page_size, offset], RawRow::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .context("read build history rows")?;
                (total, rows)
            }
        };

        let mut records = Vec::with_capacity(raw_rows.len());
        for raw in raw_rows {
            records.push(raw.into_record()?);
        }
        Ok((records, total))
    }
}

/// Row image with sqlite-native types, converted to the domain model after
/// the statement is done.
struct RawRow {
    id: String,
    project_id: String,
    platform: String,
    version: String,
    build_number: u32,
    status: String,
    timestamp_ms: i64,
    logs: Option<String>,
    log_file_path: Option<String>,
    release_note: Option<String>,
    artifact_path: Option<String>,
    format: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            platform: row.get(2)?,
            version: row.get(3)?,
            build_number: row.get(4)?,
            status: row.get(5)?,
            timestamp_ms: row.get(6)?,
            logs: row.get(7)?,
            log_file_path: row.get(8)?,
            release_note: row.get(9)?,
            artifact_path: row.get(10)?,
            format: row.get(11)?,
        })
    }

    fn into_record(self) -> anyhow::Result<BuildRecord> {
        Ok(BuildRecord {
            id: self.id.parse().context("parse build id")?,
            project_id: self.project_id,
            platform: self.platform.parse()?,
            version: self.version,
            build_number: self.build_number,
            status: self.status.parse()?,
            timestamp: chrono::DateTime::from_timestamp_millis(self.timestamp_ms)
                .context("timestamp out of range")?,
            logs: self.logs.unwrap_or_default(),
            log_file_path: self.log_file_path,
            release_note: self.release_note.unwrap_or_default(),
            artifact_path: self.artifact_path,
            format: match self.format {
                Some(format) => Some(format.parse()?),
                None => None,
            },
        })
    }
}
