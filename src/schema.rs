//! # SQLite Schema for journalite
//!
//! DDL for the three journal tables and the [`Database`] wrapper that opens
//! a connection and initializes them.
//!
//! ## Table Overview
//!
//! ```text
//! journal                     snapshots                  dispatchables
//! ┌────────────────────┐      ┌────────────────────┐     ┌─────────────────────┐
//! │ e_id (PK, auto)    │      │ stream_name    (PK)│     │ d_dispatch_id  (PK) │
//! │ stream_name        │      │ stream_version (PK)│     │ d_created_ms        │
//! │ stream_version     │      │ state_data         │     │ d_originator_id     │
//! │ entry_type         │      │ state_data_version │     │ d_state_* (nullable)│
//! │ entry_type_version │      │ state_type         │     │ d_entries           │
//! │ entry_data         │      │ state_type_version │     └─────────────────────┘
//! │ entry_metadata     │      │ state_metadata     │
//! └────────────────────┘      └────────────────────┘
//! ```
//!
//! `dispatchables.d_entries` holds the delimiter-joined identities of the
//! journal rows a dispatch record covers (empty string for none); the
//! external redelivery controller reads and deletes these rows, so their
//! column shape is a contract shared with it.

use rusqlite::Connection;

use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// The `journal` table holds one row per persisted entry.
///
/// `e_id` is the server-assigned identity backfilled into in-memory entries
/// after each batch insert. `(stream_name, stream_version)` is unique: a
/// stream position is written at most once.
const CREATE_JOURNAL: &str = r#"
CREATE TABLE IF NOT EXISTS journal (
    e_id               INTEGER PRIMARY KEY AUTOINCREMENT,
    stream_name        TEXT NOT NULL,
    stream_version     INTEGER NOT NULL,
    entry_type         TEXT NOT NULL,
    entry_type_version INTEGER NOT NULL,
    entry_data         TEXT NOT NULL,
    entry_metadata     TEXT NOT NULL
)
"#;

/// Unique index enforcing one entry per stream position, which also serves
/// stream reads in version order.
const CREATE_JOURNAL_STREAM_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS journal_stream_version
ON journal(stream_name, stream_version)
"#;

/// The `snapshots` table holds at most one state capture per stream position.
const CREATE_SNAPSHOTS: &str = r#"
CREATE TABLE IF NOT EXISTS snapshots (
    stream_name        TEXT NOT NULL,
    stream_version     INTEGER NOT NULL,
    state_data         TEXT NOT NULL,
    state_data_version INTEGER NOT NULL,
    state_type         TEXT NOT NULL,
    state_type_version INTEGER NOT NULL,
    state_metadata     TEXT NOT NULL,
    PRIMARY KEY (stream_name, stream_version)
)
"#;

/// The `dispatchables` table persists one at-least-once delivery envelope per
/// append request. Snapshot columns are NULL when the request carried none;
/// `d_entries` is the delimiter-joined covered entry-id list, or `''`.
const CREATE_DISPATCHABLES: &str = r#"
CREATE TABLE IF NOT EXISTS dispatchables (
    d_dispatch_id        TEXT PRIMARY KEY,
    d_created_ms         INTEGER NOT NULL,
    d_originator_id      TEXT NOT NULL,
    d_state_id           TEXT,
    d_state_data         TEXT,
    d_state_data_version INTEGER,
    d_state_type         TEXT,
    d_state_type_version INTEGER,
    d_state_metadata     TEXT,
    d_entries            TEXT NOT NULL
)
"#;

/// Index for the redelivery controller's oldest-first scans.
const CREATE_DISPATCHABLES_CREATED_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS dispatchables_created
ON dispatchables(d_created_ms)
"#;

/// Metadata table for schema versioning.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS journalite_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the journal schema initialized.
///
/// Owns its `Connection`; [`Database::into_connection`] hands it to the
/// writer, which requires exclusive ownership for the lifetime of the write
/// path.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file, creating and initializing it if necessary.
    ///
    /// # Errors
    ///
    /// - [`Error::Storage`] if the file can't be opened or a DDL statement
    ///   fails
    /// - [`Error::Storage`] if the schema version doesn't match
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database. Contents are lost when the connection
    /// closes; suited to tests and benchmarks.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Consumes the wrapper, yielding the initialized connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Creates tables and indexes (idempotent), sets pragmas, and verifies
    /// the schema version.
    fn initialize(&mut self) -> Result<()> {
        // WAL keeps the single writer from blocking read-only observers such
        // as the redelivery controller's connection.
        self.conn.execute_batch("PRAGMA journal_mode = WAL")?;
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON")?;

        self.conn.execute_batch(CREATE_METADATA)?;
        self.conn.execute_batch(CREATE_JOURNAL)?;
        self.conn.execute_batch(CREATE_JOURNAL_STREAM_INDEX)?;
        self.conn.execute_batch(CREATE_SNAPSHOTS)?;
        self.conn.execute_batch(CREATE_DISPATCHABLES)?;
        self.conn.execute_batch(CREATE_DISPATCHABLES_CREATED_INDEX)?;

        self.verify_or_set_version()
    }

    /// Verifies the schema version, or sets it for a new database. Version
    /// mismatches are an error; there are no migrations at v1.
    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<i32> = self
            .conn
            .query_row(
                "SELECT value FROM journalite_metadata WHERE key = 'schema_version'",
                [],
                |row| {
                    let s: String = row.get(0)?;
                    Ok(s.parse().unwrap_or(0))
                },
            )
            .ok();

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO journalite_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(Error::storage(format!(
                "schema version mismatch: database has version {v}, this build requires {SCHEMA_VERSION}"
            ))),
        }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

// =============================================================================
// Tests
// =============================================================================
