//! # Encoding Helpers
//!
//! Text encodings the write path owns: the delimiter-joined entry-id list
//! persisted on dispatch records, and the JSON form of [`Metadata`].
//!
//! ## Entry-Id List Format
//!
//! ```text
//! "12|13|14"   three covered entries, in covering order
//! ""           an empty covering set (never NULL)
//! ```
//!
//! The external redelivery controller splits on the same delimiter when it
//! re-reads unconfirmed dispatch records, so the delimiter is part of the
//! persisted contract.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::types::{EntryId, Metadata};

/// Delimiter between entry identities in a dispatch record's entries field.
pub const ENTRY_ID_DELIMITER: &str = "|";

/// Encodes entry identities as a delimiter-joined string, in order.
///
/// An empty slice encodes to the empty string.
pub fn encode_entry_ids(ids: &[EntryId]) -> String {
    ids.iter()
        .map(|id| id.as_raw().to_string())
        .collect::<Vec<_>>()
        .join(ENTRY_ID_DELIMITER)
}

/// Decodes a delimiter-joined entry-id list.
///
/// The empty string decodes to an empty list. Exact inverse of
/// [`encode_entry_ids`] for every valid encoding.
pub fn decode_entry_ids(encoded: &str) -> Result<Vec<EntryId>> {
    if encoded.is_empty() {
        return Ok(Vec::new());
    }

    encoded
        .split(ENTRY_ID_DELIMITER)
        .map(|raw| {
            raw.parse::<i64>()
                .map(EntryId::from_raw)
                .map_err(|e| Error::storage_with(format!("invalid entry id '{raw}'"), e))
        })
        .collect()
}

/// Serializes metadata to the JSON text persisted alongside its row.
pub fn serialize_metadata(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata)
        .map_err(|e| Error::storage_with("failed to serialize metadata", e))
}

/// Returns the current time in milliseconds since Unix epoch.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

// =============================================================================
// Tests
// =============================================================================
