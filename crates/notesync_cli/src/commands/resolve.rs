//! Resolve command implementation.

use super::{open_engine, CliResult, RemoteTarget};
use notesync_engine::{LocalStore, NotificationBus, SyncError};
use std::path::Path;
use std::sync::Arc;

/// Runs the resolve command.
pub async fn run(path: &Path, target: RemoteTarget, note_id: &str, keep_local: bool) -> CliResult<()> {
    let engine = open_engine(path, target, Arc::new(NotificationBus::new()))?;
    let conflict = engine
        .store()
        .get_conflict(note_id)?
        .ok_or_else(|| SyncError::ConflictNotFound {
            note_id: note_id.to_string(),
        })?;

    let chosen = if keep_local {
        Some(conflict.local_note)
    } else {
        conflict.remote_note
    };

    match chosen {
        Some(note) => {
            let note = engine.resolve_conflict_manually(note_id, note).await?;
            println!("Resolved {note_id}: {}", note.title);
        }
        None => {
            engine.delete_note(note_id).await?;
            println!("Resolved {note_id}: deleted");
        }
    }
    Ok(())
}
