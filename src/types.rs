//! # Domain Types for journalite
//!
//! Core types for the journal write path: entries, snapshots, metadata, and
//! the newtype identifiers that keep them apart.
//!
//! ## Invariants
//!
//! - [`EntryId`] is assigned by the database, exactly once per entry, in the
//!   order entries were batched. An [`Entry`] starts life without one.
//! - [`StreamVersion`] values within a multi-entry append ascend strictly
//!   from the request's declared base version, no gaps.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// The database-assigned identity of a persisted entry.
///
/// Wraps the row id the entries table assigns on insert. Unset (absent) until
/// the entry's row has been executed inside a flush; after that it never
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(i64);

impl EntryId {
    /// Creates an EntryId from a raw row id.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw row id for database storage and encoding.
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position within a named stream.
///
/// Versions are declared by the caller on append; the writer only derives the
/// ascending sequence for multi-entry requests and never invents versions of
/// its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamVersion(u32);

impl StreamVersion {
    /// The first version of a new stream.
    pub const FIRST: StreamVersion = StreamVersion(1);

    /// Creates a StreamVersion from a raw value.
    pub fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value for database storage.
    pub fn as_raw(&self) -> u32 {
        self.0
    }

    /// Returns the following version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version `offset` positions after this one.
    pub fn add(&self, offset: u32) -> Self {
        Self(self.0 + offset)
    }
}

impl fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Caller-supplied metadata attached to entries and snapshots.
///
/// Persisted as JSON text alongside the row it annotates. The writer treats
/// it as opaque apart from serialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub value: String,
    pub operation: String,
}

impl Metadata {
    pub fn new(value: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            operation: operation.into(),
        }
    }
}

// =============================================================================
// Entry
// =============================================================================

/// One domain event destined for the entries table.
///
/// The payload arrives already serialized; the writer persists it verbatim.
/// The identity is backfilled from the database during the flush that
/// persists the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    id: Option<EntryId>,
    type_name: String,
    type_version: u32,
    body: String,
    metadata: Metadata,
}

impl Entry {
    /// Creates an entry that has not yet been persisted.
    pub fn new(
        type_name: impl Into<String>,
        type_version: u32,
        body: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: None,
            type_name: type_name.into(),
            type_version,
            body: body.into(),
            metadata,
        }
    }

    /// The database-assigned identity, once persisted.
    pub fn id(&self) -> Option<EntryId> {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_version(&self) -> u32 {
        self.type_version
    }

    /// The serialized event payload.
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Backfills the database-assigned identity.
    ///
    /// Called once per entry, from the flush that executed its row.
    pub(crate) fn assign_id(&mut self, id: EntryId) {
        debug_assert!(self.id.is_none(), "entry identity is assigned exactly once");
        self.id = Some(id);
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// A point-in-time state capture for a stream.
///
/// At most one per append request. Written unconditionally when present,
/// independent of whether other requests in the same batch carry one, and
/// carried verbatim on the request's dispatch envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    id: String,
    type_name: String,
    type_version: u32,
    data: String,
    data_version: u32,
    metadata: Metadata,
}

impl Snapshot {
    pub fn new(
        id: impl Into<String>,
        type_name: impl Into<String>,
        type_version: u32,
        data: impl Into<String>,
        data_version: u32,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            type_version,
            data: data.into(),
            data_version,
            metadata,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn type_version(&self) -> u32 {
        self.type_version
    }

    /// The serialized state payload.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn data_version(&self) -> u32 {
        self.data_version
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

// =============================================================================
// Tests
// =============================================================================
