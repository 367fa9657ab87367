//! Outcome of a sync pass.

use crate::conflict::SyncConflict;
use serde::{Deserialize, Serialize};

/// A per-note failure captured during a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteError {
    /// Note ID.
    pub note_id: String,
    /// Error message.
    pub error: String,
    /// Whether a later pass may succeed.
    pub retryable: bool,
}

/// The result of one sync pass. Never mutated after it is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// True when no note failed.
    pub success: bool,
    /// IDs of notes that ended the pass synced.
    pub synced_notes: Vec<String>,
    /// Conflicts left for manual resolution.
    pub conflicts: Vec<SyncConflict>,
    /// Per-note failures.
    pub errors: Vec<NoteError>,
}

impl SyncResult {
    /// Returns true if the pass produced conflicts.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}
