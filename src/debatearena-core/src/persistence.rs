//! SQLite-backed debate records.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::capability::{DebateRecord, Persistence};
use crate::error::DebateError;
use crate::session::DebateStatus;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS debates (
    id           TEXT PRIMARY KEY,
    topic        TEXT NOT NULL,
    status       TEXT NOT NULL,
    participant1 TEXT NOT NULL,
    participant2 TEXT NOT NULL,
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    ended_at     TEXT,
    winner       TEXT
);
CREATE INDEX IF NOT EXISTS idx_debates_status ON debates(status);
";

const COLUMNS: &str =
    "id, topic, status, participant1, participant2, created_by, created_at, ended_at, winner";

/// Debate storage in a single SQLite file.
///
/// Statements are short and local, so they run inline on the calling task.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, DebateError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DebateError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch one record regardless of status.
    pub fn get(&self, id: &str) -> Result<Option<DebateRecord>, DebateError> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM debates WHERE id = ?1", COLUMNS);
        let raw = conn.query_row(&sql, params![id], RawRecord::from_row).optional()?;
        raw.map(RawRecord::into_record).transpose()
    }

    fn expect_one(changed: usize, id: &str) -> Result<(), DebateError> {
        if changed == 0 {
            return Err(DebateError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn create_debate(&self, record: &DebateRecord) -> Result<(), DebateError> {
        let sql = format!(
            "INSERT INTO debates ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            COLUMNS
        );
        self.conn.lock().execute(
            &sql,
            params![
                record.id,
                record.topic,
                record.status.as_str(),
                record.participant1,
                record.participant2,
                record.created_by,
                record.created_at.to_rfc3339(),
                record.ended_at.map(|t| t.to_rfc3339()),
                record.winner,
            ],
        )?;
        debug!(debate_id = %record.id, "debate record created");
        Ok(())
    }

    async fn update_status(&self, id: &str, status: DebateStatus) -> Result<(), DebateError> {
        let changed = self.conn.lock().execute(
            "UPDATE debates SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Self::expect_one(changed, id)
    }

    async fn update_end(
        &self,
        id: &str,
        status: DebateStatus,
        winner: Option<&str>,
    ) -> Result<(), DebateError> {
        let changed = self.conn.lock().execute(
            "UPDATE debates SET status = ?2, winner = ?3, ended_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), winner, Utc::now().to_rfc3339()],
        )?;
        Self::expect_one(changed, id)
    }

    async fn list_active(&self) -> Result<Vec<DebateRecord>, DebateError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {} FROM debates WHERE status IN ('waiting', 'active') ORDER BY created_at",
            COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], RawRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

/// Row as stored, before status and timestamps are parsed.
struct RawRecord {
    id: String,
    topic: String,
    status: String,
    participant1: String,
    participant2: String,
    created_by: String,
    created_at: String,
    ended_at: Option<String>,
    winner: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            topic: row.get(1)?,
            status: row.get(2)?,
            participant1: row.get(3)?,
            participant2: row.get(4)?,
            created_by: row.get(5)?,
            created_at: row.get(6)?,
            ended_at: row.get(7)?,
            winner: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<DebateRecord, DebateError> {
        Ok(DebateRecord {
            status: self.status.parse()?,
            created_at: parse_time(&self.created_at)?,
            ended_at: self.ended_at.as_deref().map(parse_time).transpose()?,
            id: self.id,
            topic: self.topic,
            participant1: self.participant1,
            participant2: self.participant2,
            created_by: self.created_by,
            winner: self.winner,
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, DebateError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DebateError::Persistence(format!("bad timestamp '{}': {}", value, e)))
}
