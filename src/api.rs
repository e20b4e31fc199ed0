//! # Journal Entry Point
//!
//! [`Journal`] wires the pieces together: it opens and initializes the
//! database, hands the connection and the default collaborators to the
//! writer thread, and exposes the write-path operations to async callers.
//!
//! A `Journal` is cheap to clone; every clone talks to the same writer
//! through the same serialized channel. Appends return a [`Completion`]
//! rather than blocking until durability: the completion resolves when the
//! flush that drains the request commits (or fails), which may be triggered
//! by capacity, an explicit [`Journal::flush`], or [`Journal::stop`].
//!
//! ```rust,ignore
//! let journal = Journal::open("orders.db", dispatchers, Some(control), WriterConfig::default())?;
//!
//! let completion = journal
//!     .append("orders-1", StreamVersion::FIRST, entry, None)
//!     .await?;
//! journal.flush().await?;
//! completion.await?;
//!
//! journal.stop().await?;
//! ```

use std::path::Path;

use crate::dispatch::{DispatchControl, Dispatcher};
use crate::error::Result;
use crate::queries::{QueryProvider, SqliteQueries};
use crate::schema::Database;
use crate::types::{Entry, Snapshot, StreamVersion};
use crate::writer::{spawn_journal_writer, Completion, JournalHandle, WriterConfig};

/// Async handle to an open journal write path.
#[derive(Clone)]
pub struct Journal {
    handle: JournalHandle,
}

impl Journal {
    /// Opens (creating if necessary) a journal database at `path` and spawns
    /// its writer with the default SQLite query provider.
    pub fn open(
        path: impl AsRef<Path>,
        dispatchers: Vec<Box<dyn Dispatcher>>,
        dispatch_control: Option<Box<dyn DispatchControl>>,
        config: WriterConfig,
    ) -> Result<Self> {
        let db = Database::open(path)?;
        Self::with_database(db, Box::new(SqliteQueries), dispatchers, dispatch_control, config)
    }

    /// Opens an in-memory journal. Contents are lost on stop; suited to
    /// tests and examples.
    pub fn open_in_memory(
        dispatchers: Vec<Box<dyn Dispatcher>>,
        dispatch_control: Option<Box<dyn DispatchControl>>,
        config: WriterConfig,
    ) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Self::with_database(db, Box::new(SqliteQueries), dispatchers, dispatch_control, config)
    }

    /// Spawns a writer over an already-initialized database with an explicit
    /// query provider. The seam for non-default dialects.
    pub fn with_database(
        db: Database,
        queries: Box<dyn QueryProvider>,
        dispatchers: Vec<Box<dyn Dispatcher>>,
        dispatch_control: Option<Box<dyn DispatchControl>>,
        config: WriterConfig,
    ) -> Result<Self> {
        let handle = spawn_journal_writer(
            db.into_connection(),
            queries,
            dispatchers,
            dispatch_control,
            config,
        )?;
        Ok(Self { handle })
    }

    /// Buffers one entry for `stream_name` at `stream_version`.
    pub async fn append(
        &self,
        stream_name: impl Into<String>,
        stream_version: StreamVersion,
        entry: Entry,
        snapshot: Option<Snapshot>,
    ) -> Result<Completion> {
        self.handle
            .append(stream_name, stream_version, entry, snapshot)
            .await
    }

    /// Buffers a run of entries versioned from `from_stream_version`.
    pub async fn append_many(
        &self,
        stream_name: impl Into<String>,
        from_stream_version: StreamVersion,
        entries: Vec<Entry>,
        snapshot: Option<Snapshot>,
    ) -> Result<Completion> {
        self.handle
            .append_many(stream_name, from_stream_version, entries, snapshot)
            .await
    }

    /// Forces a flush of whatever is buffered. No-op when empty.
    pub async fn flush(&self) -> Result<()> {
        self.handle.flush().await
    }

    /// Stops the writer: final flush, redelivery-controller stop, resource
    /// release. Further operations on any clone fail once this returns.
    pub async fn stop(&self) -> Result<()> {
        self.handle.stop().await
    }

    /// The underlying writer handle.
    pub fn handle(&self) -> &JournalHandle {
        &self.handle
    }
}
