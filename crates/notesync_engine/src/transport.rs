//! Remote collaborator abstraction.

use crate::error::{EngineResult, SyncError};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use notesync_protocol::Note;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// The backend operations the sync engine needs.
///
/// This trait abstracts the remote, allowing for different implementations
/// (HTTP, a simulated remote on a second store, mocks for testing).
pub trait RemoteNotes: Send + Sync {
    /// Fetches remote notes updated after `since`, or every note for `None`.
    fn fetch_since(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = EngineResult<Vec<Note>>> + Send;

    /// Creates or updates a note. Returns the stored copy.
    fn push_note(&self, note: &Note) -> impl Future<Output = EngineResult<Note>> + Send;

    /// Deletes a note. Deleting a missing note is not an error.
    fn push_deletion(&self, note_id: &str) -> impl Future<Output = EngineResult<()>> + Send;
}

/// A remote simulated on top of a [`LocalStore`].
///
/// Store failures surface as the corresponding [`SyncError::Store`] error so
/// the engine's retry classification applies unchanged. The remote can be
/// taken offline to simulate network loss.
#[derive(Debug)]
pub struct StoreRemote<S: LocalStore> {
    store: S,
    online: AtomicBool,
}

impl<S: LocalStore> StoreRemote<S> {
    /// Creates a remote backed by `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            online: AtomicBool::new(true),
        }
    }

    /// Returns the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Sets whether requests reach the remote.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> EngineResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("remote unreachable"))
        }
    }
}

impl<S: LocalStore> RemoteNotes for StoreRemote<S> {
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> EngineResult<Vec<Note>> {
        self.check_online()?;
        let notes = self.store.all_notes()?;
        Ok(match since {
            Some(since) => notes.into_iter().filter(|n| n.updated_at > since).collect(),
            None => notes,
        })
    }

    async fn push_note(&self, note: &Note) -> EngineResult<Note> {
        self.check_online()?;
        if note.id.is_empty() {
            return Err(SyncError::Validation("note id must not be empty".into()));
        }
        self.store.put_note(note)?;
        Ok(note.clone())
    }

    async fn push_deletion(&self, note_id: &str) -> EngineResult<()> {
        self.check_online()?;
        self.store.delete_note(note_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn fetch_filters_by_timestamp() {
        let remote = StoreRemote::new(MemoryStore::with_notes([
            Note::with_id("old", "t", "c", at(5)),
            Note::with_id("new", "t", "c", at(15)),
        ]));

        assert_eq!(remote.fetch_since(None).await.unwrap().len(), 2);
        let recent = remote.fetch_since(Some(at(10))).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
    }

    #[tokio::test]
    async fn push_and_delete() {
        let remote = StoreRemote::new(MemoryStore::new());
        let note = Note::with_id("a", "t", "c", at(1));

        let stored = remote.push_note(&note).await.unwrap();
        assert_eq!(stored, note);
        assert_eq!(remote.store().note_count(), 1);

        remote.push_deletion("a").await.unwrap();
        assert_eq!(remote.store().note_count(), 0);
    }

    #[tokio::test]
    async fn offline_remote_is_retryable() {
        let remote = StoreRemote::new(MemoryStore::new());
        remote.set_online(false);

        let err = remote.fetch_since(None).await.unwrap_err();
        assert!(err.is_retryable());

        remote.set_online(true);
        assert!(remote.fetch_since(None).await.is_ok());
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let remote = StoreRemote::new(MemoryStore::new());
        let note = Note::with_id("", "t", "c", at(1));
        assert!(matches!(
            remote.push_note(&note).await,
            Err(SyncError::Validation(_))
        ));
    }
}
