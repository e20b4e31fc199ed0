#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use journalite::{
    Database, DispatchControl, Dispatchable, Dispatcher, Entry, Metadata, Snapshot,
};
use rusqlite::{Connection, OpenFlags};

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub fn open_read_only(path: &Path) -> Connection {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .expect("open read-only connection")
}

pub fn entry(n: u32) -> Entry {
    Entry::new(
        "OrderPlaced",
        1,
        format!(r#"{{"order":{n}}}"#),
        Metadata::new(format!("meta-{n}"), "append"),
    )
}

pub fn snapshot(version: u32) -> Snapshot {
    Snapshot::new(
        format!("state-{version}"),
        "OrderState",
        1,
        format!(r#"{{"version":{version}}}"#),
        version,
        Metadata::new("snap", "capture"),
    )
}

pub async fn eventually<T>(
    timeout: Duration,
    interval: Duration,
    mut f: impl FnMut() -> Option<T>,
) -> T {
    let start = std::time::Instant::now();
    loop {
        if let Some(v) = f() {
            return v;
        }
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(interval).await;
    }
}

// =============================================================================
// Recording Collaborators
// =============================================================================

/// Dispatcher that records every envelope it receives.
#[derive(Clone, Default)]
pub struct RecordingDispatcher {
    received: Arc<Mutex<Vec<Dispatchable>>>,
}

impl RecordingDispatcher {
    pub fn received(&self) -> Vec<Dispatchable> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&mut self, dispatchable: &Dispatchable) {
        self.received.lock().unwrap().push(dispatchable.clone());
    }
}

/// Dispatcher that snapshots the committed journal row count at the moment
/// each envelope arrives, through its own read-only connection.
#[derive(Clone)]
pub struct VisibilityDispatcher {
    path: PathBuf,
    pub rows_seen: Arc<Mutex<Vec<i64>>>,
}

impl VisibilityDispatcher {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            rows_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Dispatcher for VisibilityDispatcher {
    fn dispatch(&mut self, _dispatchable: &Dispatchable) {
        let conn = open_read_only(&self.path);
        self.rows_seen
            .lock()
            .unwrap()
            .push(count_journal_rows(&conn));
    }
}

/// Controller that records the committed journal row count at the moment it
/// is stopped.
#[derive(Clone)]
pub struct CountingControl {
    path: PathBuf,
    pub rows_at_stop: Arc<Mutex<Option<i64>>>,
}

impl CountingControl {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            rows_at_stop: Arc::new(Mutex::new(None)),
        }
    }

    pub fn stopped(&self) -> bool {
        self.rows_at_stop.lock().unwrap().is_some()
    }
}

impl DispatchControl for CountingControl {
    fn stop(&mut self) {
        let conn = open_read_only(&self.path);
        *self.rows_at_stop.lock().unwrap() = Some(count_journal_rows(&conn));
    }
}

// =============================================================================
// Raw Read-Back
// =============================================================================

pub fn count_journal_rows(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM journal", [], |row| row.get(0))
        .expect("count journal rows")
}

#[derive(Debug)]
pub struct JournalRow {
    pub e_id: i64,
    pub stream_name: String,
    pub stream_version: i64,
    pub entry_type: String,
    pub entry_data: String,
    pub entry_metadata: String,
}

pub fn read_journal_rows(conn: &Connection) -> Vec<JournalRow> {
    let mut stmt = conn
        .prepare(
            "SELECT e_id, stream_name, stream_version, entry_type, entry_data, entry_metadata \
             FROM journal ORDER BY e_id",
        )
        .expect("prepare journal read");

    stmt.query_map([], |row| {
        Ok(JournalRow {
            e_id: row.get(0)?,
            stream_name: row.get(1)?,
            stream_version: row.get(2)?,
            entry_type: row.get(3)?,
            entry_data: row.get(4)?,
            entry_metadata: row.get(5)?,
        })
    })
    .expect("query journal rows")
    .map(|row| row.expect("read journal row"))
    .collect()
}

#[derive(Debug)]
pub struct SnapshotRow {
    pub stream_name: String,
    pub stream_version: i64,
    pub state_data: String,
}

pub fn read_snapshot_rows(conn: &Connection) -> Vec<SnapshotRow> {
    let mut stmt = conn
        .prepare(
            "SELECT stream_name, stream_version, state_data \
             FROM snapshots ORDER BY stream_name, stream_version",
        )
        .expect("prepare snapshot read");

    stmt.query_map([], |row| {
        Ok(SnapshotRow {
            stream_name: row.get(0)?,
            stream_version: row.get(1)?,
            state_data: row.get(2)?,
        })
    })
    .expect("query snapshot rows")
    .map(|row| row.expect("read snapshot row"))
    .collect()
}

#[derive(Debug)]
pub struct DispatchableRow {
    pub dispatch_id: String,
    pub originator_id: String,
    pub state_data: Option<String>,
    pub state_metadata: Option<String>,
    pub entries: String,
}

pub fn read_dispatchable_rows(conn: &Connection) -> Vec<DispatchableRow> {
    let mut stmt = conn
        .prepare(
            "SELECT d_dispatch_id, d_originator_id, d_state_data, d_state_metadata, d_entries \
             FROM dispatchables ORDER BY rowid",
        )
        .expect("prepare dispatchable read");

    stmt.query_map([], |row| {
        Ok(DispatchableRow {
            dispatch_id: row.get(0)?,
            originator_id: row.get(1)?,
            state_data: row.get(2)?,
            state_metadata: row.get(3)?,
            entries: row.get(4)?,
        })
    })
    .expect("query dispatchable rows")
    .map(|row| row.expect("read dispatchable row"))
    .collect()
}
