//! # Statement Text Providers
//!
//! The writer prepares and executes its three inserts through a
//! [`QueryProvider`], keeping dialect-specific statement text out of the
//! flush logic. Statement handles themselves are cached per connection via
//! `rusqlite`'s prepared-statement cache, so a provider only supplies SQL.
//!
//! Tests inject providers with deliberately broken statements to exercise
//! each failure boundary of a flush.

/// Parameterized insert statements for the three journal tables.
///
/// Parameter order is fixed and shared by every dialect:
///
/// - entry: `(stream_name, stream_version, entry_type, entry_type_version,
///   entry_data, entry_metadata)`
/// - snapshot: `(stream_name, stream_version, state_data, state_data_version,
///   state_type, state_type_version, state_metadata)`
/// - dispatchable: `(d_dispatch_id, d_created_ms, d_originator_id,
///   d_state_id, d_state_data, d_state_data_version, d_state_type,
///   d_state_type_version, d_state_metadata, d_entries)`
pub trait QueryProvider: Send {
    /// Insert for one entries-table row. The statement must target a table
    /// whose identity column is server-assigned, so the generated row id can
    /// be read back after each execute.
    fn insert_entry_sql(&self) -> &str;

    /// Insert for one snapshot row.
    fn insert_snapshot_sql(&self) -> &str;

    /// Insert for one dispatch-record row.
    fn insert_dispatchable_sql(&self) -> &str;
}

/// The default SQLite dialect, matching the schema in [`crate::schema`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteQueries;

const INSERT_ENTRY: &str = r#"
INSERT INTO journal (stream_name, stream_version, entry_type, entry_type_version, entry_data, entry_metadata)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const INSERT_SNAPSHOT: &str = r#"
INSERT INTO snapshots (stream_name, stream_version, state_data, state_data_version, state_type, state_type_version, state_metadata)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
"#;

const INSERT_DISPATCHABLE: &str = r#"
INSERT INTO dispatchables (d_dispatch_id, d_created_ms, d_originator_id, d_state_id, d_state_data, d_state_data_version, d_state_type, d_state_type_version, d_state_metadata, d_entries)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
"#;

impl QueryProvider for SqliteQueries {
    fn insert_entry_sql(&self) -> &str {
        INSERT_ENTRY
    }

    fn insert_snapshot_sql(&self) -> &str {
        INSERT_SNAPSHOT
    }

    fn insert_dispatchable_sql(&self) -> &str {
        INSERT_DISPATCHABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_statements_prepare() {
        let db = crate::schema::Database::open_in_memory().unwrap();
        let conn = db.connection();
        let queries = SqliteQueries;

        conn.prepare(queries.insert_entry_sql()).unwrap();
        conn.prepare(queries.insert_snapshot_sql()).unwrap();
        conn.prepare(queries.insert_dispatchable_sql()).unwrap();
    }
}
