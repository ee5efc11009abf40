//! Storage layer for persisted agent state.
//!
//! Provides a durable [`StateStore`] using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! The agent it backs is single-threaded, so one `Database` per agent is expected.
//!
//! # Schema
//!
//! Flags live in `agent_state` as `INTEGER` 0/1 keyed by name. `updated_at` is
//! an RFC 3339 UTC timestamp (e.g., `2024-01-15T10:30:00Z`) recording the last write.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use pm_core::{StateError, StateStore};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for state key {key}: {timestamp}")]
    TimestampParse {
        key: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A stored state flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRecord {
    pub key: String,
    pub value: bool,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS agent_state (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL CHECK (value IN (0, 1)),
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Reads a flag, or `None` if it was never written.
    pub fn flag(&self, key: &str) -> Result<Option<bool>, DbError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM agent_state WHERE key = ?",
                [key],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a flag, replacing any previous value.
    pub fn set_flag(&mut self, key: &str, value: bool) -> Result<(), DbError> {
        self.set_flag_at(key, value, Utc::now())
    }

    fn set_flag_at(
        &mut self,
        key: &str,
        value: bool,
        updated_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO agent_state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key, value, format_timestamp(updated_at)],
        )?;
        tracing::debug!(key, value, "state flag written");
        Ok(())
    }

    /// Lists all stored flags ordered by key.
    pub fn list_state(&self) -> Result<Vec<StateRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, updated_at FROM agent_state ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: bool = row.get(1)?;
            let updated_at: String = row.get(2)?;
            Ok((key, value, updated_at))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (key, value, updated_at) = row?;
            let updated_at = parse_timestamp(&updated_at, &key)?;
            records.push(StateRecord {
                key,
                value,
                updated_at,
            });
        }
        Ok(records)
    }
}

impl StateStore for Database {
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.flag(key) {
            Ok(value) => value.unwrap_or(default),
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to read state flag; using default");
                default
            }
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<(), StateError> {
        self.set_flag(key, value)
            .map_err(|e| StateError::new(key, e))
    }
}

fn parse_timestamp(timestamp: &str, key: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            key: key.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}
