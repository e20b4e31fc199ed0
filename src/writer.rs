//! # Batch Writer for the Journal Write Path
//!
//! This module implements batched, transactional appends. Requests are
//! buffered in a [`BatchAccumulator`] until its capacity — a total entry
//! count — is reached, then flushed in a single transaction:
//!
//! ```text
//! append / append_many
//!        │
//!        ▼
//! ┌──────────────────┐   capacity     ┌────────────────────────────────┐
//! │ BatchAccumulator │ ─────────────► │ flush                          │
//! │ (requests, size) │   reached      │  1. insert entries             │
//! └──────────────────┘                │  2. insert snapshots           │
//!                                     │  3. insert dispatch records    │
//!                                     │  4. COMMIT                     │
//!                                     │  5. forward to dispatchers     │
//!                                     │  6. resolve completions        │
//!                                     └────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - Logical size is the sum of entry counts across buffered requests, not
//!   the request count.
//! - Entry identities are read back from the database in the exact order the
//!   rows were executed, and assigned at most once.
//! - Dispatchables reach dispatchers only after a successful commit.
//! - Every drained request's completion resolves exactly once per flush,
//!   with one uniform outcome for the whole batch.
//!
//! ## Failure Contract
//!
//! Any error in the insert steps or the commit fails the entire flush: a
//! best-effort `ROLLBACK` is issued, every drained completion receives the
//! same storage failure, the error is logged, and it is returned to the
//! caller. The writer never retries and never partially recovers.
//!
//! ## Threading
//!
//! [`JournalWriter`] is fully synchronous and single-writer: it owns its
//! connection and performs no internal locking. [`spawn_journal_writer`]
//! hosts it on a dedicated thread fed by a request channel, which serializes
//! all external calls; [`JournalHandle`] is the async front.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use rusqlite::{params, Connection};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::codec;
use crate::dispatch::{
    build_dispatch_id, DispatchControl, Dispatchable, Dispatcher, IdGenerator, UlidGenerator,
};
use crate::error::{Error, Result};
use crate::queries::QueryProvider;
use crate::types::{Entry, EntryId, Snapshot, StreamVersion};

// =============================================================================
// Configuration
// =============================================================================

/// Default flush threshold, in total buffered entry count.
pub const DEFAULT_BATCH_CAPACITY: usize = 100;

/// Size of the request channel feeding the writer thread.
const REQUEST_CHANNEL_SIZE: usize = 1024;

/// Configuration for the journal writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flush threshold, in total entry count across buffered requests.
    /// Must be positive.
    pub capacity: usize,

    /// Originator id stamped on every persisted dispatch record.
    pub originator_id: String,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BATCH_CAPACITY,
            originator_id: "journalite".to_string(),
        }
    }
}

// =============================================================================
// Completion
// =============================================================================

/// Sender half of a request's completion channel.
///
/// Resolved exactly once, at the end of the flush cycle the request
/// participates in, with the uniform outcome of that flush.
pub type CompletionSender = oneshot::Sender<Result<()>>;

/// The caller-side completion of an append request.
///
/// Resolves once the flush that drained the request finishes: `Ok(())` after
/// commit and dispatch, or the flush's storage failure. Dropping it is
/// allowed; the outcome is then discarded.
#[must_use = "a completion resolves with the append outcome"]
pub struct Completion {
    rx: oneshot::Receiver<Result<()>>,
}

impl Completion {
    pub(crate) fn new(rx: oneshot::Receiver<Result<()>>) -> Self {
        Self { rx }
    }
}

impl Future for Completion {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::storage("journal writer dropped the completion")),
        })
    }
}

// =============================================================================
// Append Requests
// =============================================================================

/// One buffered caller submission.
///
/// A closed set: appends are single-entry or multi-entry, nothing else. Both
/// variants carry the stream position the caller declared, an optional
/// snapshot, and the completion resolved when their flush concludes.
pub enum AppendRequest {
    /// One entry at an exact stream version.
    Single {
        stream_name: String,
        stream_version: StreamVersion,
        entry: Entry,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    },

    /// An ordered run of entries versioned `base, base+1, …` in sequence
    /// order.
    Multi {
        stream_name: String,
        from_stream_version: StreamVersion,
        entries: Vec<Entry>,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    },
}

impl AppendRequest {
    /// The request's contribution to the accumulator's logical size.
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Single { .. } => 1,
            Self::Multi { entries, .. } => entries.len(),
        }
    }

    pub fn stream_name(&self) -> &str {
        match self {
            Self::Single { stream_name, .. } | Self::Multi { stream_name, .. } => stream_name,
        }
    }

    /// The version keying this request's snapshot row and dispatch id: the
    /// declared version for single appends, the base version for multi.
    pub fn resolved_version(&self) -> StreamVersion {
        match self {
            Self::Single { stream_version, .. } => *stream_version,
            Self::Multi {
                from_stream_version,
                ..
            } => *from_stream_version,
        }
    }

    /// Normalizes the request into the uniform shape the flush consumes,
    /// splitting off the completion sender.
    fn into_flush_parts(self) -> (FlushItem, CompletionSender) {
        match self {
            Self::Single {
                stream_name,
                stream_version,
                entry,
                snapshot,
                completion,
            } => (
                FlushItem {
                    stream_name,
                    version: stream_version,
                    entries: vec![entry],
                    snapshot,
                },
                completion,
            ),
            Self::Multi {
                stream_name,
                from_stream_version,
                entries,
                snapshot,
                completion,
            } => (
                FlushItem {
                    stream_name,
                    version: from_stream_version,
                    entries,
                    snapshot,
                },
                completion,
            ),
        }
    }
}

/// A drained request in the uniform shape the flush steps consume: entries
/// are versioned `version, version+1, …` regardless of the source variant.
struct FlushItem {
    stream_name: String,
    version: StreamVersion,
    entries: Vec<Entry>,
    snapshot: Option<Snapshot>,
}

impl FlushItem {
    /// Derives the flattened rows destined for the entries table.
    fn insert_records(&mut self) -> Vec<InsertRecord<'_>> {
        let stream_name: &str = &self.stream_name;
        let base = self.version;

        self.entries
            .iter_mut()
            .enumerate()
            .map(|(offset, entry)| InsertRecord {
                stream_name,
                stream_version: base.add(offset as u32),
                entry,
            })
            .collect()
    }
}

/// One flattened row destined for the entries table, derived from its parent
/// request at flush time. Holds the entry mutably so the database-assigned
/// identity can be backfilled after the row executes.
struct InsertRecord<'a> {
    stream_name: &'a str,
    stream_version: StreamVersion,
    entry: &'a mut Entry,
}

// =============================================================================
// Batch Accumulator
// =============================================================================

/// The pending-work buffer: ordered requests plus a running logical size.
///
/// Pure bookkeeping; it holds no transactional state. The logical size is
/// the total entry count, so a multi-entry request moves the buffer toward
/// capacity by its entry count, not by one.
pub struct BatchAccumulator {
    requests: Vec<AppendRequest>,
    size: usize,
    capacity: usize,
}

impl BatchAccumulator {
    /// Creates an accumulator with the given capacity.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }

        Ok(Self {
            requests: Vec::with_capacity(capacity),
            size: 0,
            capacity,
        })
    }

    /// Buffers a request and grows the logical size by its entry count.
    pub fn add(&mut self, request: AppendRequest) {
        self.size += request.entry_count();
        self.requests.push(request);
    }

    /// True once the logical size has reached the capacity.
    pub fn capacity_exceeded(&self) -> bool {
        self.size >= self.capacity
    }

    /// The current logical size.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Takes all buffered requests for flushing, resetting the buffer and
    /// counter. The reset happens regardless of how the flush concludes.
    pub fn drain(&mut self) -> Vec<AppendRequest> {
        self.size = 0;
        std::mem::take(&mut self.requests)
    }
}

// =============================================================================
// Journal Writer
// =============================================================================

/// The journal write path: accumulates append requests and flushes them in
/// batched transactions.
///
/// Owns its connection exclusively. Safe for a single logical thread of
/// control only; [`spawn_journal_writer`] provides the serialized hosting.
pub struct JournalWriter {
    conn: Connection,
    queries: Box<dyn QueryProvider>,
    batch: BatchAccumulator,
    dispatchers: Vec<Box<dyn Dispatcher>>,
    dispatch_control: Option<Box<dyn DispatchControl>>,
    ids: Box<dyn IdGenerator>,
    originator_id: String,
}

impl JournalWriter {
    /// Creates a writer over an already-initialized connection.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCapacity`] if the configured capacity is zero.
    pub fn new(
        conn: Connection,
        queries: Box<dyn QueryProvider>,
        dispatchers: Vec<Box<dyn Dispatcher>>,
        dispatch_control: Option<Box<dyn DispatchControl>>,
        config: WriterConfig,
    ) -> Result<Self> {
        Ok(Self {
            conn,
            queries,
            batch: BatchAccumulator::new(config.capacity)?,
            dispatchers,
            dispatch_control,
            ids: Box::new(UlidGenerator),
            originator_id: config.originator_id,
        })
    }

    /// Replaces the dispatch-id generator. Intended for deterministic ids in
    /// tests.
    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// The current logical size of the buffer, in entries.
    pub fn buffered_entries(&self) -> usize {
        self.batch.size()
    }

    /// Buffers one entry at `stream_version`, flushing if the buffer has now
    /// reached capacity.
    pub fn append(
        &mut self,
        stream_name: impl Into<String>,
        stream_version: StreamVersion,
        entry: Entry,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    ) -> Result<()> {
        self.batch.add(AppendRequest::Single {
            stream_name: stream_name.into(),
            stream_version,
            entry,
            snapshot,
            completion,
        });

        if self.batch.capacity_exceeded() {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Buffers a run of entries versioned from `from_stream_version`,
    /// flushing if the buffer has now reached capacity.
    pub fn append_many(
        &mut self,
        stream_name: impl Into<String>,
        from_stream_version: StreamVersion,
        entries: Vec<Entry>,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    ) -> Result<()> {
        self.batch.add(AppendRequest::Multi {
            stream_name: stream_name.into(),
            from_stream_version,
            entries,
            snapshot,
            completion,
        });

        if self.batch.capacity_exceeded() {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Flushes everything buffered in one transaction. No-op when empty.
    ///
    /// On success every drained completion resolves `Ok(())` after dispatch
    /// has been initiated. On failure the transaction is rolled back
    /// (best effort), every drained completion resolves with the same
    /// storage failure, and the error is returned.
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let (mut items, completions): (Vec<FlushItem>, Vec<CompletionSender>) = self
            .batch
            .drain()
            .into_iter()
            .map(AppendRequest::into_flush_parts)
            .unzip();

        match self.persist(&mut items) {
            Ok(dispatchables) => {
                self.dispatch(&dispatchables);
                for completion in completions {
                    let _ = completion.send(Ok(()));
                }
                Ok(())
            }
            Err(e) => {
                self.rollback();
                error!(error = %e, requests = completions.len(), "journal flush failed");
                for completion in completions {
                    let _ = completion.send(Err(e.for_completion()));
                }
                Err(e)
            }
        }
    }

    /// Flushes anything still buffered, stops the external redelivery
    /// controller, and releases statement-cache resources.
    ///
    /// Shutdown always runs to the end: a failed final flush does not skip
    /// the controller stop or the resource release, and is returned once
    /// both have happened.
    pub fn stop(mut self) -> Result<()> {
        let flushed = self.flush();

        if let Some(control) = self.dispatch_control.as_mut() {
            control.stop();
        }

        // Release is best effort; the writer is terminating regardless.
        self.conn.flush_prepared_statement_cache();

        flushed
    }

    // =========================================================================
    // Flush Steps
    // =========================================================================

    /// Steps 1–4: the three batched inserts and the commit, in order, inside
    /// one transaction.
    fn persist(&mut self, items: &mut [FlushItem]) -> Result<Vec<Dispatchable>> {
        self.conn
            .execute("BEGIN IMMEDIATE", [])
            .map_err(|e| Error::storage_with("could not begin journal transaction", e))?;

        self.insert_entries(items)?;
        self.insert_snapshots(items)?;
        let dispatchables = self.insert_dispatchables(items)?;

        self.conn
            .execute("COMMIT", [])
            .map_err(|e| Error::storage_with("could not commit journal transaction", e))?;

        Ok(dispatchables)
    }

    /// Step 1: insert every derived entry row and backfill the generated
    /// identities in execution order.
    fn insert_entries(&mut self, items: &mut [FlushItem]) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(self.queries.insert_entry_sql())?;

        for item in items.iter_mut() {
            for record in item.insert_records() {
                let metadata = codec::serialize_metadata(record.entry.metadata())?;
                let changed = stmt.execute(params![
                    record.stream_name,
                    record.stream_version.as_raw(),
                    record.entry.type_name(),
                    record.entry.type_version(),
                    record.entry.body(),
                    metadata,
                ])?;

                if changed == 0 {
                    return Err(Error::storage("journal entry row not applied"));
                }

                record
                    .entry
                    .assign_id(EntryId::from_raw(self.conn.last_insert_rowid()));
            }
        }

        Ok(())
    }

    /// Step 2: insert one snapshot row per request that carries one, keyed
    /// by the request's stream name and resolved version.
    fn insert_snapshots(&mut self, items: &[FlushItem]) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare_cached(self.queries.insert_snapshot_sql())?;

        for item in items {
            let Some(snapshot) = &item.snapshot else {
                continue;
            };

            let metadata = codec::serialize_metadata(snapshot.metadata())?;
            let changed = stmt.execute(params![
                item.stream_name,
                item.version.as_raw(),
                snapshot.data(),
                snapshot.data_version(),
                snapshot.type_name(),
                snapshot.type_version(),
                metadata,
            ])?;

            if changed == 0 {
                return Err(Error::storage("snapshot row not applied"));
            }
        }

        Ok(())
    }

    /// Step 3: build one dispatch envelope per drained request, in order,
    /// and insert its record. Envelopes take ownership of the request's
    /// entries and snapshot; one timestamp covers the whole flush.
    fn insert_dispatchables(&mut self, items: &mut [FlushItem]) -> Result<Vec<Dispatchable>> {
        let now = codec::current_time_ms();

        let mut dispatchables = Vec::with_capacity(items.len());
        for item in items.iter_mut() {
            let id = build_dispatch_id(&item.stream_name, item.version, self.ids.as_mut());
            let snapshot = item.snapshot.take();
            let entries = std::mem::take(&mut item.entries);
            dispatchables.push(Dispatchable::new(id, now, snapshot, entries));
        }

        let mut stmt = self
            .conn
            .prepare_cached(self.queries.insert_dispatchable_sql())?;

        for dispatchable in &dispatchables {
            let encoded = codec::encode_entry_ids(&dispatchable.entry_ids());

            let (state_id, state_data, state_data_version, state_type, state_type_version, state_metadata) =
                match dispatchable.snapshot() {
                    Some(state) => (
                        Some(state.id()),
                        Some(state.data()),
                        Some(state.data_version()),
                        Some(state.type_name()),
                        Some(state.type_version()),
                        Some(codec::serialize_metadata(state.metadata())?),
                    ),
                    None => (None, None, None, None, None, None),
                };

            let changed = stmt.execute(params![
                dispatchable.id(),
                dispatchable.created_ms() as i64,
                self.originator_id,
                state_id,
                state_data,
                state_data_version,
                state_type,
                state_type_version,
                state_metadata,
                encoded,
            ])?;

            if changed == 0 {
                return Err(Error::storage("dispatch record row not applied"));
            }
        }

        Ok(dispatchables)
    }

    /// Step 5: forward every envelope to every registered dispatcher, in
    /// construction order. Runs only after a successful commit.
    fn dispatch(&mut self, dispatchables: &[Dispatchable]) {
        for dispatcher in &mut self.dispatchers {
            for dispatchable in dispatchables {
                dispatcher.dispatch(dispatchable);
            }
        }
    }

    /// Best-effort rollback after a failed flush, so the connection is
    /// usable again. Skipped when no transaction is open (the failure
    /// happened before `BEGIN` took effect).
    fn rollback(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }

        if let Err(e) = self.conn.execute("ROLLBACK", []) {
            warn!(error = %e, "rollback after failed journal flush did not complete");
        }
    }
}

// =============================================================================
// Async Front
// =============================================================================

/// A request sent to the writer thread.
pub enum WriteRequest {
    Append {
        stream_name: String,
        stream_version: StreamVersion,
        entry: Entry,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    },

    AppendMany {
        stream_name: String,
        from_stream_version: StreamVersion,
        entries: Vec<Entry>,
        snapshot: Option<Snapshot>,
        completion: CompletionSender,
    },

    Flush {
        reply: oneshot::Sender<Result<()>>,
    },

    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Async handle to the journal writer thread.
///
/// Cloneable; every clone feeds the same writer through the same serialized
/// channel.
#[derive(Clone)]
pub struct JournalHandle {
    tx: mpsc::Sender<WriteRequest>,
}

impl JournalHandle {
    /// Buffers one entry. The returned [`Completion`] resolves with the
    /// outcome of the flush that eventually persists (or fails) it.
    pub async fn append(
        &self,
        stream_name: impl Into<String>,
        stream_version: StreamVersion,
        entry: Entry,
        snapshot: Option<Snapshot>,
    ) -> Result<Completion> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Append {
                stream_name: stream_name.into(),
                stream_version,
                entry,
                snapshot,
                completion: tx,
            })
            .await
            .map_err(|_| Error::storage("journal writer has shut down"))?;

        Ok(Completion::new(rx))
    }

    /// Buffers a multi-entry request. Same completion contract as
    /// [`JournalHandle::append`].
    pub async fn append_many(
        &self,
        stream_name: impl Into<String>,
        from_stream_version: StreamVersion,
        entries: Vec<Entry>,
        snapshot: Option<Snapshot>,
    ) -> Result<Completion> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::AppendMany {
                stream_name: stream_name.into(),
                from_stream_version,
                entries,
                snapshot,
                completion: tx,
            })
            .await
            .map_err(|_| Error::storage("journal writer has shut down"))?;

        Ok(Completion::new(rx))
    }

    /// Forces a flush of whatever is buffered and awaits its outcome.
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Flush { reply: tx })
            .await
            .map_err(|_| Error::storage("journal writer has shut down"))?;

        rx.await
            .map_err(|_| Error::storage("journal writer dropped the flush reply"))?
    }

    /// Stops the writer: final flush, controller stop, resource release.
    /// The writer thread exits afterwards.
    pub async fn stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(WriteRequest::Stop { reply: tx })
            .await
            .map_err(|_| Error::storage("journal writer has shut down"))?;

        rx.await
            .map_err(|_| Error::storage("journal writer dropped the stop reply"))?
    }
}

/// Runs the writer loop on the current thread until a stop request arrives
/// or the channel closes.
fn run_journal_writer(mut writer: JournalWriter, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = rx.blocking_recv() {
        match request {
            WriteRequest::Append {
                stream_name,
                stream_version,
                entry,
                snapshot,
                completion,
            } => {
                // A flush failure was already logged and delivered to every
                // buffered completion.
                let _ = writer.append(stream_name, stream_version, entry, snapshot, completion);
            }
            WriteRequest::AppendMany {
                stream_name,
                from_stream_version,
                entries,
                snapshot,
                completion,
            } => {
                let _ = writer.append_many(
                    stream_name,
                    from_stream_version,
                    entries,
                    snapshot,
                    completion,
                );
            }
            WriteRequest::Flush { reply } => {
                let _ = reply.send(writer.flush());
            }
            WriteRequest::Stop { reply } => {
                let _ = reply.send(writer.stop());
                return;
            }
        }
    }

    // Channel closed without an explicit stop: run the same shutdown.
    if let Err(e) = writer.stop() {
        error!(error = %e, "final flush during journal writer shutdown failed");
    }
}

/// Spawns the writer on a dedicated thread and returns its async handle.
pub fn spawn_journal_writer(
    conn: Connection,
    queries: Box<dyn QueryProvider>,
    dispatchers: Vec<Box<dyn Dispatcher>>,
    dispatch_control: Option<Box<dyn DispatchControl>>,
    config: WriterConfig,
) -> Result<JournalHandle> {
    let writer = JournalWriter::new(conn, queries, dispatchers, dispatch_control, config)?;
    let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);

    std::thread::Builder::new()
        .name("journalite-writer".to_string())
        .spawn(move || run_journal_writer(writer, rx))
        .map_err(|e| Error::storage_with("failed to spawn journal writer thread", e))?;

    Ok(JournalHandle { tx })
}

// =============================================================================
// Tests
// =============================================================================
