//! Conflict detection and resolution policy.

use crate::note::Note;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of concurrent edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Both sides edited the note.
    Update,
    /// The note was edited locally and deleted remotely.
    Delete,
}

/// A note edited on both sides since the last confirmed sync point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    /// Note ID.
    pub note_id: String,
    /// Local copy at detection time.
    pub local_note: Note,
    /// Remote copy at detection time, `None` for delete conflicts.
    pub remote_note: Option<Note>,
    /// Conflict kind.
    pub conflict_type: ConflictType,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Creates a new conflict.
    pub fn new(local_note: Note, remote_note: Option<Note>, detected_at: DateTime<Utc>) -> Self {
        let conflict_type = if remote_note.is_some() {
            ConflictType::Update
        } else {
            ConflictType::Delete
        };
        Self {
            note_id: local_note.id.clone(),
            local_note,
            remote_note,
            conflict_type,
            detected_at,
        }
    }

    /// Returns true if this is an update-delete conflict.
    pub fn is_delete_conflict(&self) -> bool {
        self.conflict_type == ConflictType::Delete
    }
}

/// What to do with one note during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Only the local side changed (or the remote copy is stale): push.
    Push,
    /// Only the remote side changed: pull.
    Pull,
    /// The remote copy was deleted and the local copy is unchanged.
    DeleteLocal,
    /// Nothing to transfer.
    InSync,
    /// Both sides changed since the last sync.
    Conflict(ConflictType),
}

/// Decides how to reconcile `local` against its remote counterpart.
///
/// A side has changed when its `updated_at` is later than the local
/// `last_synced_at`; a note that was never synced counts as changed, and a
/// missing remote copy of a previously synced note counts as a remote
/// change (deletion). When both sides changed, a remote copy older than
/// the local edit is stale and the local copy is pushed; a remote copy with
/// the same timestamp and payload is already in sync.
///
/// Timestamps come from unsynchronised clients and are compared as-is.
pub fn reconcile(local: &Note, remote: Option<&Note>) -> Reconciliation {
    let local_changed = local.changed_since_sync();

    let Some(remote) = remote else {
        return match (local.last_synced_at, local_changed) {
            (None, _) => Reconciliation::Push,
            (Some(_), true) => Reconciliation::Conflict(ConflictType::Delete),
            (Some(_), false) => Reconciliation::DeleteLocal,
        };
    };

    let remote_changed = match local.last_synced_at {
        Some(synced) => remote.updated_at > synced,
        None => true,
    };

    match (local_changed, remote_changed) {
        (false, false) => Reconciliation::InSync,
        (true, false) => Reconciliation::Push,
        (false, true) => Reconciliation::Pull,
        (true, true) => {
            if remote.updated_at < local.updated_at {
                Reconciliation::Push
            } else if remote.updated_at == local.updated_at && remote.same_content(local) {
                Reconciliation::InSync
            } else {
                Reconciliation::Conflict(ConflictType::Update)
            }
        }
    }
}

/// Strategy for conflicts found during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// The local copy wins and overwrites the remote.
    #[default]
    Local,
    /// The remote copy wins. The local edit is discarded.
    Remote,
    /// Conflicts are stored for later manual resolution.
    Manual,
}

impl ResolutionStrategy {
    /// Returns true if this strategy resolves conflicts without user input.
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ResolutionStrategy::Manual)
    }

    /// Returns true if the strategy can discard local edits.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ResolutionStrategy::Remote)
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(ResolutionStrategy::Local),
            "remote" => Ok(ResolutionStrategy::Remote),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(format!("unknown resolution strategy: {other}")),
        }
    }
}
