//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. Engine code calls named
//! store operations — it never executes SQL directly. Every mutating
//! workflow runs inside a single transaction; partial application is never
//! observable. Rows are normalized into the typed model here, at the
//! boundary, so nullable columns and stray values never leak upward.

mod debt;
mod installment;
mod link;
mod plan;

use crate::error::{PlanError, PlanResult};
use crate::event::{EventLogEntry, PlanEvent};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

pub struct PlanStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PlanStore {
    pub fn open(path: &str) -> PlanResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| PlanError::Unavailable(e.to_string()))?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PlanResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database.
    /// For in-memory databases, this returns a new isolated database.
    pub fn reopen(&self) -> PlanResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PlanResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_plans.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_debts.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_cross_plan_links.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/004_event_log.sql"))?;
        log::debug!("Schema migrations applied");
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, event: &PlanEvent, today: NaiveDate) -> PlanResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (event_type, payload, recorded_on) VALUES (?1, ?2, ?3)",
            params![
                event.type_name(),
                serde_json::to_string(event)?,
                sql_date(today),
            ],
        )?;
        Ok(())
    }

    pub fn recent_events(&self, limit: u32) -> PlanResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, event_type, payload, recorded_on
             FROM event_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    event_type: row.get(1)?,
                    payload: row.get(2)?,
                    recorded_on: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> PlanResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

// ── Column codecs ──────────────────────────────────────────────

pub(crate) fn sql_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn bad_column(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

pub(crate) fn date_column(idx: usize, value: Option<String>) -> rusqlite::Result<Option<NaiveDate>> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| bad_column(idx, format!("bad date '{s}': {e}"))),
    }
}
