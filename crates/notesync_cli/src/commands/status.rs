//! Status command implementation.

use super::{open_local, CliResult};
use notesync_engine::LocalStore;
use notesync_protocol::SyncStatus;
use std::path::Path;

/// Runs the status command.
pub fn run(path: &Path) -> CliResult<()> {
    let store = open_local(path)?;
    let metadata = store.get_metadata()?.unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&metadata)?);

    let notes = store.all_notes()?;
    let waiting = notes
        .iter()
        .filter(|n| n.sync_status != SyncStatus::Synced)
        .count();
    println!("Notes: {} ({waiting} not synced)", notes.len());
    Ok(())
}
