//! # journalite — Event Journal Write Path
//!
//! journalite is the write side of an append-only event journal backed by
//! SQLite. It buffers append requests, commits them in batches inside a
//! single transaction, backfills the database-assigned entry identities,
//! and notifies downstream consumers only after durability is confirmed.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Async Callers                             │
//! │            (append, append_many, flush, stop)                   │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │  serialized request channel
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Writer Thread                              │
//! │             (single thread, owns the connection)                │
//! │                                                                 │
//! │  ┌──────────────┐  ┌───────────────────┐  ┌──────────────────┐  │
//! │  │    Batch     │  │  Transactional    │  │    Dispatch      │  │
//! │  │ Accumulator  │  │      Flush        │  │   (post-commit)  │  │
//! │  └──────────────┘  └───────────────────┘  └──────────────────┘  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          SQLite                                 │
//! │          journal · snapshots · dispatchables                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Single logical writer**: one thread owns the connection; the
//!    request channel serializes all callers.
//! 2. **Fixed flush order**: entries → snapshots → dispatch records →
//!    commit → dispatch → completion, within every flush.
//! 3. **Identity backfill**: entry identities come from the database, in
//!    the order rows were batched, assigned at most once.
//! 4. **At-least-once dispatch**: a dispatch record is persisted in the
//!    same transaction as the entries it covers, and its envelope reaches
//!    dispatchers only after commit.
//! 5. **Uniform completion**: every request drained by a flush resolves
//!    exactly once, success or failure, with the whole batch's outcome.
//!
//! ## Module Organization
//!
//! - [`error`]: the single storage-failure kind and `Result` alias
//! - [`types`]: entries, snapshots, metadata, identifier newtypes
//! - [`codec`]: entry-id list encoding and metadata JSON
//! - [`schema`]: SQLite DDL and the [`Database`] wrapper
//! - [`queries`]: dialect seam producing the three insert statements
//! - [`dispatch`]: dispatch envelopes and collaborator traits
//! - [`writer`]: batch accumulator, flush orchestration, writer thread
//! - [`api`]: the [`Journal`] entry point

pub mod api;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod queries;
pub mod schema;
pub mod types;
pub mod writer;

pub use api::Journal;
pub use dispatch::{DispatchControl, Dispatchable, Dispatcher, IdGenerator, UlidGenerator};
pub use error::{Error, Result};
pub use queries::{QueryProvider, SqliteQueries};
pub use schema::Database;
pub use types::{Entry, EntryId, Metadata, Snapshot, StreamVersion};
pub use writer::{
    spawn_journal_writer, AppendRequest, BatchAccumulator, Completion, JournalHandle,
    JournalWriter, WriterConfig,
};
