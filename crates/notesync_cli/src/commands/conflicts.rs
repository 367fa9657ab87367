//! Conflicts command implementation.

use super::{open_local, CliResult};
use notesync_engine::LocalStore;
use std::path::Path;

/// Runs the conflicts command.
pub fn run(path: &Path) -> CliResult<()> {
    let store = open_local(path)?;
    let conflicts = store.all_conflicts()?;
    if conflicts.is_empty() {
        println!("No conflicts");
        return Ok(());
    }

    for conflict in conflicts {
        println!(
            "{}  {:?}  detected {}",
            conflict.note_id,
            conflict.conflict_type,
            conflict.detected_at.to_rfc3339()
        );
        println!("  local:  {}", conflict.local_note.title);
        match &conflict.remote_note {
            Some(remote) => println!("  remote: {}", remote.title),
            None => println!("  remote: (deleted)"),
        }
    }
    Ok(())
}
