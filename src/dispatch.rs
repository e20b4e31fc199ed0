//! # Dispatch Envelopes and Collaborator Traits
//!
//! After a flush commits, every append request it drained is represented by
//! one [`Dispatchable`]: an at-least-once delivery envelope that was
//! persisted inside the same transaction as the entries it covers. The
//! writer forwards each envelope to every registered [`Dispatcher`] exactly
//! once; a separate, longer-lived controller re-delivers envelopes whose
//! receipt is never confirmed, and is reached from here only through
//! [`DispatchControl::stop`].
//!
//! ## Dispatch Id Scheme
//!
//! ```text
//! orders-1:3:01J9ZV7Q7E7Y7K3F4D2M5N6P8R
//! └──────┘ │ └─────────────────────────┘
//!  stream  version      random component
//! ```
//!
//! The random component keeps ids unique even when the same stream/version
//! pair is dispatched again across redelivery cycles.

use ulid::Ulid;

use crate::types::{Entry, EntryId, Snapshot, StreamVersion};

/// Separator between the segments of a dispatch id.
pub const DISPATCH_ID_SEPARATOR: &str = ":";

// =============================================================================
// Dispatchable
// =============================================================================

/// An at-least-once delivery envelope for one committed append request.
///
/// Built at flush time, after entry identities are known; persisted in the
/// flush transaction; handed to dispatchers only after commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatchable {
    id: String,
    created_ms: u64,
    snapshot: Option<Snapshot>,
    entries: Vec<Entry>,
}

impl Dispatchable {
    pub fn new(
        id: impl Into<String>,
        created_ms: u64,
        snapshot: Option<Snapshot>,
        entries: Vec<Entry>,
    ) -> Self {
        Self {
            id: id.into(),
            created_ms,
            snapshot,
            entries,
        }
    }

    /// The globally unique dispatch id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Creation time of the enclosing flush, milliseconds since Unix epoch.
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    /// The request's snapshot, carried verbatim.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// The covered entries, in covering order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    /// The identities of the covered entries, in covering order.
    ///
    /// Entries reach an envelope only after the flush backfilled their
    /// identities, so this covers every entry the envelope carries.
    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.entries.iter().filter_map(Entry::id).collect()
    }
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// A downstream consumer of committed dispatchables.
///
/// Zero or more dispatchers may be registered with a writer. Each receives
/// every envelope a successful flush produced, in construction order, after
/// the transaction committed. Dispatch outcomes do not feed back into append
/// completions.
pub trait Dispatcher: Send {
    fn dispatch(&mut self, dispatchable: &Dispatchable);
}

/// Handle to the external redelivery controller.
///
/// The writer only ever tells it to stop, during shutdown; redelivery policy
/// lives entirely on the controller's side.
pub trait DispatchControl: Send {
    fn stop(&mut self);
}

/// Source of the unique random component of dispatch ids.
pub trait IdGenerator: Send {
    fn generate(&mut self) -> String;
}

/// The default generator: one ULID per dispatch id.
#[derive(Debug, Clone, Copy, Default)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn generate(&mut self) -> String {
        Ulid::new().to_string()
    }
}

/// Builds a dispatch id for a request at `stream_name`/`version`.
pub(crate) fn build_dispatch_id(
    stream_name: &str,
    version: StreamVersion,
    ids: &mut dyn IdGenerator,
) -> String {
    format!(
        "{stream_name}{sep}{version}{sep}{random}",
        sep = DISPATCH_ID_SEPARATOR,
        random = ids.generate()
    )
}

// =============================================================================
// Tests
// =============================================================================
