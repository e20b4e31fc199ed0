//! Failure Semantics
//!
//! Tests the uniform-failure contract of a flush:
//! - a failing step fails every drained request, not just the culprit
//! - nothing is dispatched after a failed flush
//! - the "row not applied" sentinel is treated as a storage failure
//! - the connection is usable again after the rollback

mod common;

use journalite::{
    Database, Error, Journal, JournalWriter, QueryProvider, SqliteQueries, StreamVersion,
    WriterConfig,
};
use tokio::sync::oneshot;

/// Provider whose dispatch-record statement targets a missing table,
/// simulating a driver failure in step 3 after entries and snapshots
/// executed in the same transaction.
struct BrokenDispatchables {
    inner: SqliteQueries,
}

impl QueryProvider for BrokenDispatchables {
    fn insert_entry_sql(&self) -> &str {
        self.inner.insert_entry_sql()
    }
    fn insert_snapshot_sql(&self) -> &str {
        self.inner.insert_snapshot_sql()
    }
    fn insert_dispatchable_sql(&self) -> &str {
        "INSERT INTO no_such_table (x) VALUES (?1)"
    }
}

/// Provider whose entry insert silently skips conflicting rows, producing
/// the zero-rows-changed sentinel instead of a driver error.
struct IgnoringEntries;

impl QueryProvider for IgnoringEntries {
    fn insert_entry_sql(&self) -> &str {
        "INSERT OR IGNORE INTO journal \
         (stream_name, stream_version, entry_type, entry_type_version, entry_data, entry_metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
    }
    fn insert_snapshot_sql(&self) -> &str {
        "INSERT INTO snapshots \
         (stream_name, stream_version, state_data, state_data_version, state_type, state_type_version, state_metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
    }
    fn insert_dispatchable_sql(&self) -> &str {
        "INSERT INTO dispatchables \
         (d_dispatch_id, d_created_ms, d_originator_id, d_state_id, d_state_data, d_state_data_version, d_state_type, d_state_type_version, d_state_metadata, d_entries) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
    }
}

/// Scenario: dispatch-record insertion fails after entries and snapshots
/// already executed in-batch. Every buffered request fails, nothing reaches
/// a dispatcher, and the error surfaces to the caller.
#[test]
fn dispatch_record_failure_fails_the_whole_flush() {
    let (_dir, path) = common::create_temp_db_file("step3_failure.db");
    let dispatcher = common::RecordingDispatcher::default();
    let mut writer = JournalWriter::new(
        Database::open(&path).unwrap().into_connection(),
        Box::new(BrokenDispatchables {
            inner: SqliteQueries,
        }),
        vec![Box::new(dispatcher.clone())],
        None,
        WriterConfig::default(),
    )
    .unwrap();

    let (tx1, mut rx1) = oneshot::channel();
    let (tx2, mut rx2) = oneshot::channel();
    writer
        .append(
            "orders-1",
            StreamVersion::from_raw(1),
            common::entry(1),
            Some(common::snapshot(1)),
            tx1,
        )
        .unwrap();
    writer
        .append("orders-1", StreamVersion::from_raw(2), common::entry(2), None, tx2)
        .unwrap();

    let err = writer.flush().unwrap_err();
    assert!(matches!(err, Error::Storage { .. }));

    // Uniform failure for every request, including the one whose rows were
    // individually fine.
    let failure1 = rx1.try_recv().unwrap().unwrap_err();
    let failure2 = rx2.try_recv().unwrap().unwrap_err();
    assert_eq!(failure1.to_string(), failure2.to_string());

    // No dispatchable reached any dispatcher.
    assert_eq!(dispatcher.count(), 0);

    // The rollback discarded the partial transaction.
    let read = common::open_read_only(&path);
    assert_eq!(common::count_journal_rows(&read), 0);
    assert!(common::read_snapshot_rows(&read).is_empty());
    assert!(common::read_dispatchable_rows(&read).is_empty());
}

/// A row the database reports as not applied fails the step even though the
/// driver raised no error.
#[test]
fn row_not_applied_is_a_storage_failure() {
    let (_dir, path) = common::create_temp_db_file("not_applied.db");
    let mut writer = JournalWriter::new(
        Database::open(&path).unwrap().into_connection(),
        Box::new(IgnoringEntries),
        Vec::new(),
        None,
        WriterConfig::default(),
    )
    .unwrap();

    // Same stream position twice in one batch: the second insert is ignored
    // by the unique index and reports zero rows changed.
    let (tx1, mut rx1) = oneshot::channel();
    let (tx2, mut rx2) = oneshot::channel();
    writer
        .append("orders-1", StreamVersion::from_raw(1), common::entry(1), None, tx1)
        .unwrap();
    writer
        .append("orders-1", StreamVersion::from_raw(1), common::entry(2), None, tx2)
        .unwrap();

    let err = writer.flush().unwrap_err();
    assert!(err.to_string().contains("not applied"));
    assert!(rx1.try_recv().unwrap().is_err());
    assert!(rx2.try_recv().unwrap().is_err());
}

/// After a failed flush the buffer is clear and the connection usable: the
/// next flush cycle starts cleanly and commits.
#[test]
fn writer_recovers_after_a_failed_flush() {
    let (_dir, path) = common::create_temp_db_file("recovery.db");
    let mut writer = JournalWriter::new(
        Database::open(&path).unwrap().into_connection(),
        Box::new(IgnoringEntries),
        Vec::new(),
        None,
        WriterConfig::default(),
    )
    .unwrap();

    let (tx1, _rx1) = oneshot::channel();
    let (tx2, _rx2) = oneshot::channel();
    writer
        .append("orders-1", StreamVersion::from_raw(1), common::entry(1), None, tx1)
        .unwrap();
    writer
        .append("orders-1", StreamVersion::from_raw(1), common::entry(2), None, tx2)
        .unwrap();
    assert!(writer.flush().is_err());
    assert_eq!(writer.buffered_entries(), 0);

    let (tx3, mut rx3) = oneshot::channel();
    writer
        .append("orders-2", StreamVersion::from_raw(1), common::entry(3), None, tx3)
        .unwrap();
    writer.flush().unwrap();
    assert!(rx3.try_recv().unwrap().is_ok());

    let read = common::open_read_only(&path);
    assert_eq!(common::count_journal_rows(&read), 1);
}

#[test]
fn zero_capacity_is_rejected_at_construction() {
    let db = Database::open_in_memory().unwrap();
    let result = JournalWriter::new(
        db.into_connection(),
        Box::new(SqliteQueries),
        Vec::new(),
        None,
        WriterConfig {
            capacity: 0,
            ..WriterConfig::default()
        },
    );

    assert!(matches!(result, Err(Error::InvalidCapacity(0))));
}

/// The same failure contract holds through the async front: the flush call
/// errors and the append completion resolves with the failure.
#[tokio::test]
async fn failure_reaches_async_callers() {
    let (_dir, path) = common::create_temp_db_file("async_failure.db");
    let journal = Journal::with_database(
        Database::open(&path).unwrap(),
        Box::new(BrokenDispatchables {
            inner: SqliteQueries,
        }),
        Vec::new(),
        None,
        WriterConfig::default(),
    )
    .unwrap();

    let completion = journal
        .append("orders-1", StreamVersion::FIRST, common::entry(1), None)
        .await
        .unwrap();

    journal.flush().await.unwrap_err();
    completion.await.unwrap_err();

    journal.stop().await.unwrap();
}
