//! Add command implementation.

use super::{open_local, CliResult};
use chrono::Utc;
use notesync_engine::LocalStore;
use notesync_protocol::Note;
use std::path::Path;

/// Runs the add command.
pub fn run(path: &Path, title: &str, content: &str, tags: Vec<String>) -> CliResult<()> {
    let store = open_local(path)?;
    let note = Note::new(title, content, Utc::now()).with_tags(tags);
    store.put_note(&note)?;

    let mut metadata = store.get_metadata()?.unwrap_or_default();
    metadata.pending_sync_count += 1;
    store.put_metadata(&metadata)?;

    println!("{}", note.id);
    Ok(())
}
