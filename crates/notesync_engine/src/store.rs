//! Local Store contract.

use notesync_protocol::{Note, SyncConflict, SyncMetadata};
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored data is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// The store has no room left.
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Another transaction holds the collection.
    #[error("collection locked: {0}")]
    Locked(String),
}

impl StoreError {
    /// Returns true for failures that plausibly clear up on their own.
    ///
    /// Quota and corruption errors are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Locked(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Durable key-value storage for notes, sync metadata and conflicts.
///
/// All records are addressed by id. The engine wraps calls with its retry
/// policy, so implementations report contention as [`StoreError::Locked`]
/// rather than blocking.
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For testing and ephemeral use
/// - [`crate::JsonFileStore`] - For persistent storage
pub trait LocalStore: Send + Sync {
    /// Reads a note.
    fn get_note(&self, id: &str) -> StoreResult<Option<Note>>;

    /// Reads every note.
    fn all_notes(&self) -> StoreResult<Vec<Note>>;

    /// Inserts or replaces a note.
    fn put_note(&self, note: &Note) -> StoreResult<()>;

    /// Removes a note. Removing a missing note is not an error.
    fn delete_note(&self, id: &str) -> StoreResult<()>;

    /// Reads the sync metadata, `None` before the first write.
    fn get_metadata(&self) -> StoreResult<Option<SyncMetadata>>;

    /// Writes the sync metadata.
    fn put_metadata(&self, metadata: &SyncMetadata) -> StoreResult<()>;

    /// Reads the conflict stored for a note.
    fn get_conflict(&self, note_id: &str) -> StoreResult<Option<SyncConflict>>;

    /// Reads every stored conflict.
    fn all_conflicts(&self) -> StoreResult<Vec<SyncConflict>>;

    /// Inserts or replaces the conflict for `conflict.note_id`.
    fn put_conflict(&self, conflict: &SyncConflict) -> StoreResult<()>;

    /// Removes the conflict for a note. Removing a missing one is not an error.
    fn delete_conflict(&self, note_id: &str) -> StoreResult<()>;
}

impl<S: LocalStore + ?Sized> LocalStore for std::sync::Arc<S> {
    fn get_note(&self, id: &str) -> StoreResult<Option<Note>> {
        (**self).get_note(id)
    }

    fn all_notes(&self) -> StoreResult<Vec<Note>> {
        (**self).all_notes()
    }

    fn put_note(&self, note: &Note) -> StoreResult<()> {
        (**self).put_note(note)
    }

    fn delete_note(&self, id: &str) -> StoreResult<()> {
        (**self).delete_note(id)
    }

    fn get_metadata(&self) -> StoreResult<Option<SyncMetadata>> {
        (**self).get_metadata()
    }

    fn put_metadata(&self, metadata: &SyncMetadata) -> StoreResult<()> {
        (**self).put_metadata(metadata)
    }

    fn get_conflict(&self, note_id: &str) -> StoreResult<Option<SyncConflict>> {
        (**self).get_conflict(note_id)
    }

    fn all_conflicts(&self) -> StoreResult<Vec<SyncConflict>> {
        (**self).all_conflicts()
    }

    fn put_conflict(&self, conflict: &SyncConflict) -> StoreResult<()> {
        (**self).put_conflict(conflict)
    }

    fn delete_conflict(&self, note_id: &str) -> StoreResult<()> {
        (**self).delete_conflict(note_id)
    }
}
