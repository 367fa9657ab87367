//! In-memory Local Store.

use crate::store::{LocalStore, StoreError, StoreResult};
use notesync_protocol::{Note, SyncConflict, SyncMetadata};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};

/// A failure the [`MemoryStore`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Transient lock contention.
    Locked,
    /// Permanent quota exhaustion.
    QuotaExceeded,
    /// Permanent corruption.
    Corrupted,
}

impl InjectedFailure {
    fn to_error(self, what: &str) -> StoreError {
        match self {
            InjectedFailure::Locked => StoreError::Locked(what.to_string()),
            InjectedFailure::QuotaExceeded => StoreError::QuotaExceeded(what.to_string()),
            InjectedFailure::Corrupted => StoreError::Corrupted(what.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    any: Option<(u32, InjectedFailure)>,
    by_note: HashMap<String, (u32, InjectedFailure)>,
}

impl Faults {
    fn take(slot: &mut Option<(u32, InjectedFailure)>) -> Option<InjectedFailure> {
        let (remaining, kind) = slot.as_mut()?;
        let kind = *kind;
        *remaining -= 1;
        if *remaining == 0 {
            *slot = None;
        }
        Some(kind)
    }
}

#[derive(Debug, Default)]
struct Collections {
    notes: BTreeMap<String, Note>,
    metadata: Option<SyncMetadata>,
    conflicts: BTreeMap<String, SyncConflict>,
}

/// A Local Store that keeps everything in memory.
///
/// Suitable for tests, for ephemeral sessions and as the backing of a
/// simulated remote. Failures can be injected to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Collections>,
    faults: Mutex<Faults>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with notes.
    #[must_use]
    pub fn with_notes(notes: impl IntoIterator<Item = Note>) -> Self {
        let store = Self::new();
        {
            let mut data = store.data.write();
            for note in notes {
                data.notes.insert(note.id.clone(), note);
            }
        }
        store
    }

    /// Makes the next `count` operations of any kind fail.
    pub fn fail_next(&self, count: u32, failure: InjectedFailure) {
        self.faults.lock().any = (count > 0).then_some((count, failure));
    }

    /// Makes the next `count` reads or writes of one note fail.
    pub fn fail_note(&self, note_id: impl Into<String>, count: u32, failure: InjectedFailure) {
        let mut faults = self.faults.lock();
        let note_id = note_id.into();
        if count == 0 {
            faults.by_note.remove(&note_id);
        } else {
            faults.by_note.insert(note_id, (count, failure));
        }
    }

    /// Returns the number of stored notes.
    pub fn note_count(&self) -> usize {
        self.data.read().notes.len()
    }

    fn check(&self, what: &str) -> StoreResult<()> {
        match Faults::take(&mut self.faults.lock().any) {
            Some(kind) => Err(kind.to_error(what)),
            None => Ok(()),
        }
    }

    fn check_note(&self, id: &str) -> StoreResult<()> {
        self.check("notes")?;
        let mut faults = self.faults.lock();
        let Some((remaining, kind)) = faults.by_note.get_mut(id) else {
            return Ok(());
        };
        *remaining -= 1;
        let kind = *kind;
        if *remaining == 0 {
            faults.by_note.remove(id);
        }
        Err(kind.to_error(&format!("notes/{id}")))
    }
}

impl LocalStore for MemoryStore {
    fn get_note(&self, id: &str) -> StoreResult<Option<Note>> {
        self.check_note(id)?;
        Ok(self.data.read().notes.get(id).cloned())
    }

    fn all_notes(&self) -> StoreResult<Vec<Note>> {
        self.check("notes")?;
        Ok(self.data.read().notes.values().cloned().collect())
    }

    fn put_note(&self, note: &Note) -> StoreResult<()> {
        self.check_note(&note.id)?;
        self.data
            .write()
            .notes
            .insert(note.id.clone(), note.clone());
        Ok(())
    }

    fn delete_note(&self, id: &str) -> StoreResult<()> {
        self.check_note(id)?;
        self.data.write().notes.remove(id);
        Ok(())
    }

    fn get_metadata(&self) -> StoreResult<Option<SyncMetadata>> {
        self.check("metadata")?;
        Ok(self.data.read().metadata.clone())
    }

    fn put_metadata(&self, metadata: &SyncMetadata) -> StoreResult<()> {
        self.check("metadata")?;
        self.data.write().metadata = Some(metadata.clone());
        Ok(())
    }

    fn get_conflict(&self, note_id: &str) -> StoreResult<Option<SyncConflict>> {
        self.check("conflicts")?;
        Ok(self.data.read().conflicts.get(note_id).cloned())
    }

    fn all_conflicts(&self) -> StoreResult<Vec<SyncConflict>> {
        self.check("conflicts")?;
        Ok(self.data.read().conflicts.values().cloned().collect())
    }

    fn put_conflict(&self, conflict: &SyncConflict) -> StoreResult<()> {
        self.check("conflicts")?;
        self.data
            .write()
            .conflicts
            .insert(conflict.note_id.clone(), conflict.clone());
        Ok(())
    }

    fn delete_conflict(&self, note_id: &str) -> StoreResult<()> {
        self.check("conflicts")?;
        self.data.write().conflicts.remove(note_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn notes_roundtrip() {
        let store = MemoryStore::new();
        let note = Note::with_id("a", "t", "c", Utc::now());

        store.put_note(&note).unwrap();
        assert_eq!(store.get_note("a").unwrap(), Some(note));
        assert_eq!(store.all_notes().unwrap().len(), 1);

        store.delete_note("a").unwrap();
        assert_eq!(store.get_note("a").unwrap(), None);
        store.delete_note("a").unwrap();
    }

    #[test]
    fn conflicts_are_keyed_by_note() {
        let store = MemoryStore::new();
        let note = Note::with_id("a", "t", "c", Utc::now());
        let conflict = SyncConflict::new(note.clone(), Some(note), Utc::now());

        store.put_conflict(&conflict).unwrap();
        store.put_conflict(&conflict).unwrap();
        assert_eq!(store.all_conflicts().unwrap().len(), 1);

        store.delete_conflict("a").unwrap();
        assert!(store.get_conflict("a").unwrap().is_none());
    }

    #[test]
    fn metadata_starts_empty() {
        let store = MemoryStore::new();
        assert!(store.get_metadata().unwrap().is_none());
        store.put_metadata(&SyncMetadata::default()).unwrap();
        assert_eq!(store.get_metadata().unwrap(), Some(SyncMetadata::default()));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next(2, InjectedFailure::Locked);

        assert!(matches!(store.all_notes(), Err(StoreError::Locked(_))));
        assert!(matches!(store.get_metadata(), Err(StoreError::Locked(_))));
        assert!(store.all_notes().is_ok());
    }

    #[test]
    fn note_failures_target_one_id() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.fail_note("b", 1, InjectedFailure::QuotaExceeded);

        store.put_note(&Note::with_id("a", "t", "c", now)).unwrap();
        assert!(matches!(
            store.put_note(&Note::with_id("b", "t", "c", now)),
            Err(StoreError::QuotaExceeded(_))
        ));
        store.put_note(&Note::with_id("b", "t", "c", now)).unwrap();
        assert_eq!(store.note_count(), 2);
    }
}
