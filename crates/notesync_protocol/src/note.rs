//! The syncable note and its per-note sync status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync status of a single note.
///
/// Transitions: `Pending -> Syncing -> {Synced | Conflict | Error}`.
/// `Conflict -> Synced` happens only through a resolution, `Error` notes
/// re-enter `Syncing` on the next pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Local and remote agree.
    Synced,
    /// A sync pass is processing the note.
    Syncing,
    /// Both sides changed; waiting for a resolution.
    Conflict,
    /// The last attempt failed.
    Error,
    /// Local changes not yet pushed.
    Pending,
}

impl SyncStatus {
    /// Returns true if the note still has work for the sync engine.
    pub fn needs_sync(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Error)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
            SyncStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A note as seen by the sync layer.
///
/// `title`, `content` and `tags` are the editor payload and are opaque to
/// sync. The remaining fields are bookkeeping: `local_version` only ever
/// grows, and `remote_version` is only written by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identifier.
    pub id: String,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last local mutation.
    pub updated_at: DateTime<Utc>,
    /// Sync status.
    pub sync_status: SyncStatus,
    /// Time of the last successful reconciliation.
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Incremented on every local mutation.
    #[serde(default)]
    pub local_version: u64,
    /// Mirrored from the last successful push or pull.
    #[serde(default)]
    pub remote_version: u64,
}

impl Note {
    /// Creates a new, never-synced note with a random id.
    pub fn new(title: impl Into<String>, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), title, content, now)
    }

    /// Creates a new, never-synced note with the given id.
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            local_version: 1,
            remote_version: 0,
        }
    }

    /// Sets the tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Records a local mutation made at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.local_version += 1;
        self.sync_status = SyncStatus::Pending;
    }

    /// Returns true if the editor payload of both notes is identical.
    pub fn same_content(&self, other: &Note) -> bool {
        self.title == other.title && self.content == other.content && self.tags == other.tags
    }

    /// Returns true if the note changed after its last confirmed sync.
    ///
    /// A note that was never synced always counts as changed.
    pub fn changed_since_sync(&self) -> bool {
        match self.last_synced_at {
            Some(synced) => self.updated_at > synced,
            None => true,
        }
    }
}
