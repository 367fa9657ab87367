//! File-based Local Store for persistent storage.

use crate::store::{LocalStore, StoreError, StoreResult};
use notesync_protocol::{Note, SyncConflict, SyncMetadata};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const NOTES_FILE: &str = "notes.json";
const METADATA_FILE: &str = "metadata.json";
const CONFLICTS_FILE: &str = "conflicts.json";

/// `ENOSPC` on Unix, `ERROR_DISK_FULL` on Windows.
const DISK_FULL_CODES: [i32; 2] = [28, 112];

/// A Local Store backed by JSON files in a directory.
///
/// Each collection lives in its own file. Every write replaces the file
/// through a temporary file and a rename, so a crash leaves either the old
/// or the new contents. Data survives process restarts.
///
/// # Thread Safety
///
/// Operations are serialised by an internal lock. Two processes sharing a
/// directory are not coordinated.
///
/// # Example
///
/// ```no_run
/// use notesync_engine::{JsonFileStore, LocalStore};
/// use std::path::Path;
///
/// let store = JsonFileStore::open(Path::new("notes-data")).unwrap();
/// let notes = store.all_notes().unwrap();
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    /// Returns the directory holding the collection files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned + Default>(&self, name: &str) -> StoreResult<T> {
        let path = self.dir.join(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(T::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", path.display())))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> StoreResult<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let bytes = serde_json::to_vec_pretty(value)?;

        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        result.map_err(|e| match e.raw_os_error() {
            Some(code) if DISK_FULL_CODES.contains(&code) => {
                StoreError::QuotaExceeded(path.display().to_string())
            }
            _ => StoreError::Io(e),
        })
    }

    fn update<T, F>(&self, name: &str, f: F) -> StoreResult<()>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T),
    {
        let _guard = self.lock.lock();
        let mut value: T = self.read(name)?;
        f(&mut value);
        self.write(name, &value)
    }
}

impl LocalStore for JsonFileStore {
    fn get_note(&self, id: &str) -> StoreResult<Option<Note>> {
        let _guard = self.lock.lock();
        let mut notes: BTreeMap<String, Note> = self.read(NOTES_FILE)?;
        Ok(notes.remove(id))
    }

    fn all_notes(&self) -> StoreResult<Vec<Note>> {
        let _guard = self.lock.lock();
        let notes: BTreeMap<String, Note> = self.read(NOTES_FILE)?;
        Ok(notes.into_values().collect())
    }

    fn put_note(&self, note: &Note) -> StoreResult<()> {
        self.update(NOTES_FILE, |notes: &mut BTreeMap<String, Note>| {
            notes.insert(note.id.clone(), note.clone());
        })
    }

    fn delete_note(&self, id: &str) -> StoreResult<()> {
        self.update(NOTES_FILE, |notes: &mut BTreeMap<String, Note>| {
            notes.remove(id);
        })
    }

    fn get_metadata(&self) -> StoreResult<Option<SyncMetadata>> {
        let _guard = self.lock.lock();
        self.read(METADATA_FILE)
    }

    fn put_metadata(&self, metadata: &SyncMetadata) -> StoreResult<()> {
        let _guard = self.lock.lock();
        self.write(METADATA_FILE, metadata)
    }

    fn get_conflict(&self, note_id: &str) -> StoreResult<Option<SyncConflict>> {
        let _guard = self.lock.lock();
        let mut conflicts: BTreeMap<String, SyncConflict> = self.read(CONFLICTS_FILE)?;
        Ok(conflicts.remove(note_id))
    }

    fn all_conflicts(&self) -> StoreResult<Vec<SyncConflict>> {
        let _guard = self.lock.lock();
        let conflicts: BTreeMap<String, SyncConflict> = self.read(CONFLICTS_FILE)?;
        Ok(conflicts.into_values().collect())
    }

    fn put_conflict(&self, conflict: &SyncConflict) -> StoreResult<()> {
        self.update(
            CONFLICTS_FILE,
            |conflicts: &mut BTreeMap<String, SyncConflict>| {
                conflicts.insert(conflict.note_id.clone(), conflict.clone());
            },
        )
    }

    fn delete_conflict(&self, note_id: &str) -> StoreResult<()> {
        self.update(
            CONFLICTS_FILE,
            |conflicts: &mut BTreeMap<String, SyncConflict>| {
                conflicts.remove(note_id);
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn survives_reopen() {
        let dir = tempdir().unwrap();
        let note = Note::with_id("a", "title", "body", Utc::now());
        let metadata = SyncMetadata {
            pending_sync_count: 3,
            ..SyncMetadata::default()
        };

        {
            let store = JsonFileStore::open(dir.path()).unwrap();
            store.put_note(&note).unwrap();
            store.put_metadata(&metadata).unwrap();
            store
                .put_conflict(&SyncConflict::new(note.clone(), None, Utc::now()))
                .unwrap();
        }

        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.get_note("a").unwrap(), Some(note));
        assert_eq!(store.get_metadata().unwrap(), Some(metadata));
        assert_eq!(store.all_conflicts().unwrap().len(), 1);
    }

    #[test]
    fn empty_directory_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(&dir.path().join("nested")).unwrap();
        assert!(store.all_notes().unwrap().is_empty());
        assert!(store.get_metadata().unwrap().is_none());
        assert!(store.get_conflict("x").unwrap().is_none());
    }

    #[test]
    fn delete_removes_note() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store
            .put_note(&Note::with_id("a", "t", "c", Utc::now()))
            .unwrap();
        store.delete_note("a").unwrap();
        assert!(store.get_note("a").unwrap().is_none());
        assert!(!dir.path().join("notes.json.tmp").exists());
    }

    #[test]
    fn garbage_is_reported_as_corruption() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(NOTES_FILE), b"{not json").unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert!(matches!(store.all_notes(), Err(StoreError::Corrupted(_))));
    }
}
