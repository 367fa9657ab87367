//! Sync command implementation.

use super::{open_engine, CliEngine, CliResult, RemoteTarget};
use notesync_engine::{LocalStore, NotificationBus};
use notesync_protocol::{ResolutionStrategy, SyncResult};
use std::path::Path;
use std::sync::Arc;

/// Runs the sync command.
pub async fn run(path: &Path, target: RemoteTarget, strategy: ResolutionStrategy) -> CliResult<()> {
    let engine = open_engine(path, target, Arc::new(NotificationBus::new()))?;
    let result = pass(&engine, strategy).await?;
    print_result(&result);
    Ok(())
}

/// Runs one pass over every note in the local directory.
pub async fn pass(engine: &CliEngine, strategy: ResolutionStrategy) -> CliResult<SyncResult> {
    if strategy.is_lossy() {
        tracing::warn!("remote strategy discards local edits of conflicting notes");
    }
    let notes = engine.store().all_notes()?;
    Ok(engine.sync_notes(notes, strategy).await?)
}

/// Prints a pass summary.
pub fn print_result(result: &SyncResult) {
    println!("Synced: {}", result.synced_notes.len());
    for id in &result.synced_notes {
        println!("  {id}");
    }
    if result.has_conflicts() {
        println!("Conflicts: {}", result.conflicts.len());
        for conflict in &result.conflicts {
            println!("  {} ({:?})", conflict.note_id, conflict.conflict_type);
        }
    }
    if !result.errors.is_empty() {
        println!("Errors: {}", result.errors.len());
        for error in &result.errors {
            let hint = if error.retryable { "retryable" } else { "permanent" };
            println!("  {}: {} [{hint}]", error.note_id, error.error);
        }
    }
}
