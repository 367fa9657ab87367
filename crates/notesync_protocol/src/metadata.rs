//! Session-scoped sync metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync bookkeeping persisted alongside the notes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    /// Completion time of the last sync pass.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Whether sync passes may run.
    pub sync_enabled: bool,
    /// Notes waiting for a sync pass.
    pub pending_sync_count: u64,
    /// Unresolved conflicts.
    pub conflict_count: u64,
}

impl Default for SyncMetadata {
    fn default() -> Self {
        Self {
            last_sync_time: None,
            sync_enabled: true,
            pending_sync_count: 0,
            conflict_count: 0,
        }
    }
}
