//! Conflict-resolving sync engine.
//!
//! A sync pass reconciles a batch of local notes against one snapshot of the
//! remote. Each note is processed independently, in the order given: a
//! failure on one note is recorded in the result and the pass continues.
//!
//! Only one pass (or manual resolution) runs at a time. Metadata is written
//! once, at the end of the pass, so readers never observe a pass in progress.

use crate::bus::{NotificationBus, SyncEvent};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{EngineResult, SyncError};
use crate::retry::RetryPolicy;
use crate::store::{LocalStore, StoreResult};
use crate::transport::RemoteNotes;
use chrono::{DateTime, Utc};
use futures::future;
use notesync_protocol::{
    reconcile, ConflictType, Note, NoteError, Reconciliation, ResolutionStrategy, SyncConflict,
    SyncMetadata, SyncResult, SyncStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What [`SyncEngine::handle_remote_event`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEventOutcome {
    /// The change was applied to the Local Store.
    Applied,
    /// The change could not be applied now; the next pass reconciles it.
    Deferred,
    /// The remote asked for a sync pass.
    SyncRequested,
    /// The event needed no action.
    Ignored,
}

enum NoteOutcome {
    Synced,
    Deleted,
    Conflict(SyncConflict),
    AwaitingResolution,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The sync engine.
///
/// Reconciles local notes with a remote, resolving concurrent edits with a
/// [`ResolutionStrategy`]. Store and remote calls are retried with backoff
/// when their failures are transient.
pub struct SyncEngine<R: RemoteNotes, S: LocalStore> {
    config: SyncConfig,
    remote: R,
    store: S,
    clock: Arc<dyn Clock>,
    bus: Arc<NotificationBus>,
    store_retry: RetryPolicy<SyncError>,
    remote_retry: RetryPolicy<SyncError>,
    in_flight: AtomicBool,
}

impl<R: RemoteNotes, S: LocalStore> std::fmt::Debug for SyncEngine<R, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("in_flight", &self.is_syncing())
            .finish()
    }
}

impl<R: RemoteNotes, S: LocalStore> SyncEngine<R, S> {
    /// Creates a new sync engine.
    pub fn new(
        config: SyncConfig,
        remote: R,
        store: S,
        clock: Arc<dyn Clock>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        let store_retry = RetryPolicy::new(config.store_retry.clone());
        let remote_retry = RetryPolicy::new(config.remote_retry.clone());
        Self {
            config,
            remote,
            store,
            clock,
            bus,
            store_retry,
            remote_retry,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the Local Store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns true while a pass or manual resolution is running.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    fn begin(&self) -> EngineResult<InFlight<'_>> {
        self.try_begin().ok_or(SyncError::SyncInProgress)
    }

    async fn with_store<T>(&self, op: impl Fn(&S) -> StoreResult<T>) -> EngineResult<T> {
        self.store_retry
            .run(|| future::ready(op(&self.store).map_err(SyncError::from)))
            .await
    }

    /// Re-reads the metadata and applies `f` to the fresh copy, so fields
    /// changed while a pass was suspended are kept.
    async fn update_metadata(&self, f: impl FnOnce(&mut SyncMetadata)) -> EngineResult<()> {
        let mut metadata = self.load_metadata().await?;
        f(&mut metadata);
        self.with_store(|s| s.put_metadata(&metadata)).await
    }

    async fn load_metadata(&self) -> EngineResult<SyncMetadata> {
        Ok(self
            .with_store(|s| s.get_metadata())
            .await?
            .unwrap_or_default())
    }

    /// Runs one sync pass over `local_notes`.
    ///
    /// Per-note failures are captured in [`SyncResult::errors`]; the pass
    /// itself only fails when it cannot start, when the remote snapshot
    /// cannot be fetched, or when the final metadata write fails.
    pub async fn sync_notes(
        &self,
        local_notes: Vec<Note>,
        strategy: ResolutionStrategy,
    ) -> EngineResult<SyncResult> {
        let _guard = self.begin()?;

        if !self.load_metadata().await?.sync_enabled {
            return Err(SyncError::SyncDisabled);
        }

        let now = self.clock.now();
        info!(notes = local_notes.len(), ?strategy, "starting sync pass");

        let snapshot = match self.remote_retry.run(|| self.remote.fetch_since(None)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "failed to fetch remote notes");
                let pending = local_notes.len() as u64;
                let recorded = self
                    .update_metadata(|m| m.pending_sync_count = m.pending_sync_count.max(pending))
                    .await;
                if let Err(write_err) = recorded {
                    warn!(error = %write_err, "failed to record pending notes");
                }
                self.bus.emit(&SyncEvent::Error {
                    message: format!("sync pass failed: {e}"),
                });
                return Err(e);
            }
        };
        let mut remote_notes: HashMap<String, Note> = snapshot
            .into_iter()
            .map(|note| (note.id.clone(), note))
            .collect();

        let mut result = SyncResult::default();

        for note in local_notes {
            let remote = remote_notes.remove(&note.id);
            self.sync_note(note, remote, strategy, now, &mut result)
                .await;
        }

        if self.config.pull_new_remote_notes {
            for (id, remote) in remote_notes {
                match self.pull_new(remote, now).await {
                    Ok(true) => result.synced_notes.push(id),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(note_id = %id, error = %e, "failed to pull remote note");
                        result.errors.push(note_error(id, &e));
                    }
                }
            }
        }

        result.success = result.errors.is_empty();

        let conflict_count = self.with_store(|s| s.all_conflicts()).await?.len() as u64;
        let finished_at = self.clock.now();
        let pending = result.errors.len() as u64;
        self.update_metadata(|m| {
            m.last_sync_time = Some(finished_at);
            m.pending_sync_count = pending;
            m.conflict_count = conflict_count;
        })
        .await?;

        info!(
            synced = result.synced_notes.len(),
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            "sync pass complete"
        );
        self.bus.emit(&SyncEvent::SyncCompleted {
            synced: result.synced_notes.len(),
            conflicts: result.conflicts.len(),
            errors: result.errors.len(),
        });

        Ok(result)
    }

    async fn sync_note(
        &self,
        note: Note,
        remote: Option<Note>,
        strategy: ResolutionStrategy,
        now: DateTime<Utc>,
        result: &mut SyncResult,
    ) {
        let id = note.id.clone();
        let mut working = note;

        let prepared = self.prepare(&working).await;
        let outcome = match prepared {
            Ok((merged, existing)) => {
                working = merged;
                working.sync_status = SyncStatus::Syncing;
                let had_conflict = existing.is_some();
                let outcome = self
                    .process_note(&working, remote.as_ref(), existing, strategy, now)
                    .await;
                match outcome {
                    Ok(NoteOutcome::Synced | NoteOutcome::Deleted) if had_conflict => {
                        self.clear_conflict(&id).await.map(|()| NoteOutcome::Synced)
                    }
                    other => other,
                }
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(NoteOutcome::Synced | NoteOutcome::Deleted) => result.synced_notes.push(id),
            Ok(NoteOutcome::Conflict(conflict)) => {
                info!(note_id = %id, kind = ?conflict.conflict_type, "conflict stored for manual resolution");
                self.bus.emit(&SyncEvent::ConflictDetected(conflict.clone()));
                result.conflicts.push(conflict);
            }
            Ok(NoteOutcome::AwaitingResolution) => {
                debug!(note_id = %id, "note still awaiting manual resolution");
            }
            Err(e) => {
                warn!(note_id = %id, error = %e, "failed to sync note");
                if let Err(put_err) = self.record_error_status(working) {
                    debug!(note_id = %id, error = %put_err, "could not record error status");
                }
                result.errors.push(note_error(id, &e));
            }
        }
    }

    /// Marks the current copy of a failed note as `Error`.
    ///
    /// A stored copy with a higher `local_version` than `working` wins, so a
    /// stale batch note never replaces a newer local edit. Conflict markers
    /// are left alone.
    fn record_error_status(&self, working: Note) -> StoreResult<()> {
        let mut current = match self.store.get_note(&working.id)? {
            Some(stored) if stored.local_version > working.local_version => stored,
            _ => working,
        };
        if current.sync_status == SyncStatus::Conflict {
            return Ok(());
        }
        current.sync_status = SyncStatus::Error;
        self.store.put_note(&current)
    }

    /// Loads the stored copy and any stored conflict for a batch note.
    ///
    /// A batch note older than the stored copy is replaced by it; a newer one
    /// inherits the stored sync bookkeeping.
    async fn prepare(&self, note: &Note) -> EngineResult<(Note, Option<SyncConflict>)> {
        let stored = self.with_store(|s| s.get_note(&note.id)).await?;
        let existing = self.with_store(|s| s.get_conflict(&note.id)).await?;

        let working = match stored {
            Some(stored) if stored.local_version >= note.local_version => stored,
            Some(stored) => {
                let mut newer = note.clone();
                newer.last_synced_at = newer.last_synced_at.max(stored.last_synced_at);
                newer.remote_version = newer.remote_version.max(stored.remote_version);
                newer
            }
            None => note.clone(),
        };
        Ok((working, existing))
    }

    async fn process_note(
        &self,
        working: &Note,
        remote: Option<&Note>,
        existing: Option<SyncConflict>,
        strategy: ResolutionStrategy,
        now: DateTime<Utc>,
    ) -> EngineResult<NoteOutcome> {
        if strategy == ResolutionStrategy::Manual {
            if let Some(conflict) = existing {
                self.refresh_conflict(conflict, working, remote).await?;
                return Ok(NoteOutcome::AwaitingResolution);
            }
        }

        let decision = reconcile(working, remote);
        debug!(note_id = %working.id, ?decision, "reconciling note");

        match (decision, remote) {
            (Reconciliation::InSync, _) => self.mark_synced(working, remote, now).await,
            (Reconciliation::Push, _) => self.push(working, remote, now).await,
            (Reconciliation::Pull, Some(remote)) => self.pull(working, remote, now).await,
            (Reconciliation::DeleteLocal, _) | (Reconciliation::Pull, None) => {
                self.delete_local(&working.id).await
            }
            (Reconciliation::Conflict(kind), _) => {
                self.resolve(working, remote, kind, strategy, now).await
            }
        }
    }

    async fn resolve(
        &self,
        working: &Note,
        remote: Option<&Note>,
        kind: ConflictType,
        strategy: ResolutionStrategy,
        now: DateTime<Utc>,
    ) -> EngineResult<NoteOutcome> {
        match strategy {
            ResolutionStrategy::Local => {
                debug!(note_id = %working.id, ?kind, "conflict resolved in favour of local copy");
                self.push(working, remote, now).await
            }
            ResolutionStrategy::Remote => {
                warn!(note_id = %working.id, ?kind, "conflict resolved in favour of remote copy; local edits discarded");
                match remote {
                    Some(remote) => self.pull(working, remote, now).await,
                    None => self.delete_local(&working.id).await,
                }
            }
            ResolutionStrategy::Manual => {
                let mut local = working.clone();
                local.sync_status = SyncStatus::Conflict;
                let conflict = SyncConflict::new(local.clone(), remote.cloned(), now);
                self.with_store(|s| s.put_conflict(&conflict)).await?;
                self.with_store(|s| s.put_note(&local)).await?;
                Ok(NoteOutcome::Conflict(conflict))
            }
        }
    }

    async fn refresh_conflict(
        &self,
        mut conflict: SyncConflict,
        working: &Note,
        remote: Option<&Note>,
    ) -> EngineResult<()> {
        let mut local = working.clone();
        local.sync_status = SyncStatus::Conflict;
        conflict.local_note = local.clone();
        conflict.remote_note = remote.cloned();
        conflict.conflict_type = if remote.is_some() {
            ConflictType::Update
        } else {
            ConflictType::Delete
        };
        self.with_store(|s| s.put_conflict(&conflict)).await?;
        self.with_store(|s| s.put_note(&local)).await
    }

    async fn mark_synced(
        &self,
        working: &Note,
        remote: Option<&Note>,
        now: DateTime<Utc>,
    ) -> EngineResult<NoteOutcome> {
        let mut synced = working.clone();
        synced.sync_status = SyncStatus::Synced;
        synced.last_synced_at = Some(now);
        if let Some(remote) = remote {
            synced.remote_version = synced.remote_version.max(remote.remote_version);
        }
        self.with_store(|s| s.put_note(&synced)).await?;
        Ok(NoteOutcome::Synced)
    }

    async fn push(
        &self,
        working: &Note,
        remote: Option<&Note>,
        now: DateTime<Utc>,
    ) -> EngineResult<NoteOutcome> {
        let mut pushed = working.clone();
        pushed.sync_status = SyncStatus::Synced;
        pushed.last_synced_at = Some(now);
        pushed.remote_version =
            working.remote_version.max(remote.map_or(0, |r| r.remote_version)) + 1;

        let stored = self
            .remote_retry
            .run(|| self.remote.push_note(&pushed))
            .await?;
        pushed.remote_version = pushed.remote_version.max(stored.remote_version);

        self.with_store(|s| s.put_note(&pushed)).await?;
        debug!(note_id = %pushed.id, remote_version = pushed.remote_version, "pushed note");
        Ok(NoteOutcome::Synced)
    }

    async fn pull(
        &self,
        working: &Note,
        remote: &Note,
        now: DateTime<Utc>,
    ) -> EngineResult<NoteOutcome> {
        let pulled = pulled_copy(working, remote, now);
        self.with_store(|s| s.put_note(&pulled)).await?;
        debug!(note_id = %pulled.id, "pulled note");
        Ok(NoteOutcome::Synced)
    }

    async fn delete_local(&self, note_id: &str) -> EngineResult<NoteOutcome> {
        self.with_store(|s| s.delete_note(note_id)).await?;
        debug!(note_id, "deleted note removed remotely");
        Ok(NoteOutcome::Deleted)
    }

    async fn clear_conflict(&self, note_id: &str) -> EngineResult<()> {
        self.with_store(|s| s.delete_conflict(note_id)).await?;
        self.bus.emit(&SyncEvent::ConflictResolved {
            note_id: note_id.to_string(),
        });
        Ok(())
    }

    /// Stores a remote-only note locally. Returns false if a local copy
    /// already exists.
    async fn pull_new(&self, remote: Note, now: DateTime<Utc>) -> EngineResult<bool> {
        if self.with_store(|s| s.get_note(&remote.id)).await?.is_some() {
            return Ok(false);
        }
        let mut pulled = remote;
        pulled.sync_status = SyncStatus::Synced;
        pulled.last_synced_at = Some(now);
        self.with_store(|s| s.put_note(&pulled)).await?;
        debug!(note_id = %pulled.id, "pulled new remote note");
        Ok(true)
    }

    /// Resolves a stored conflict with `resolved_note`.
    ///
    /// The note is written to the remote and the Local Store as the new
    /// canonical copy, the conflict is cleared and the conflict count drops
    /// by one.
    pub async fn resolve_conflict_manually(
        &self,
        note_id: &str,
        resolved_note: Note,
    ) -> EngineResult<Note> {
        let _guard = self.begin()?;

        if resolved_note.id != note_id {
            return Err(SyncError::Validation(format!(
                "resolved note id {} does not match {note_id}",
                resolved_note.id
            )));
        }

        let conflict = self
            .with_store(|s| s.get_conflict(note_id))
            .await?
            .ok_or_else(|| SyncError::ConflictNotFound {
                note_id: note_id.to_string(),
            })?;

        let now = self.clock.now();
        let remote_version = conflict
            .remote_note
            .as_ref()
            .map_or(0, |r| r.remote_version)
            .max(conflict.local_note.remote_version)
            .max(resolved_note.remote_version);

        let mut note = resolved_note;
        note.local_version = note.local_version.max(conflict.local_note.local_version) + 1;
        note.remote_version = remote_version + 1;
        note.sync_status = SyncStatus::Synced;
        note.last_synced_at = Some(now);

        self.remote_retry
            .run(|| self.remote.push_note(&note))
            .await?;
        self.with_store(|s| s.put_note(&note)).await?;
        self.with_store(|s| s.delete_conflict(note_id)).await?;

        self.update_metadata(|m| m.conflict_count = m.conflict_count.saturating_sub(1))
            .await?;

        info!(note_id, "conflict resolved manually");
        self.bus.emit(&SyncEvent::ConflictResolved {
            note_id: note_id.to_string(),
        });
        Ok(note)
    }

    /// Returns the metadata of the last completed pass.
    pub async fn get_sync_metadata(&self) -> EngineResult<SyncMetadata> {
        self.load_metadata().await
    }

    /// Lists conflicts awaiting manual resolution.
    pub async fn pending_conflicts(&self) -> EngineResult<Vec<SyncConflict>> {
        self.with_store(|s| s.all_conflicts()).await
    }

    /// Enables or disables sync passes.
    pub async fn set_sync_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.update_metadata(|m| m.sync_enabled = enabled).await?;
        info!(enabled, "sync enabled changed");
        Ok(())
    }

    /// Marks a note as waiting for the next pass.
    pub async fn mark_pending(&self, note_id: &str) -> EngineResult<()> {
        let note = self
            .with_store(|s| s.get_note(note_id))
            .await?
            .ok_or_else(|| SyncError::NotFound(note_id.to_string()))?;
        self.mark_pending_note(note).await
    }

    async fn mark_pending_note(&self, mut note: Note) -> EngineResult<()> {
        if matches!(note.sync_status, SyncStatus::Pending | SyncStatus::Conflict) {
            return Ok(());
        }
        note.sync_status = SyncStatus::Pending;
        self.with_store(|s| s.put_note(&note)).await?;

        self.update_metadata(|m| m.pending_sync_count += 1).await
    }

    /// Deletes a note locally and on the remote.
    ///
    /// The remote deletion happens first so that a failure leaves both sides
    /// untouched. Any stored conflict for the note is discarded.
    pub async fn delete_note(&self, note_id: &str) -> EngineResult<()> {
        let _guard = self.begin()?;

        self.remote_retry
            .run(|| self.remote.push_deletion(note_id))
            .await?;
        self.with_store(|s| s.delete_note(note_id)).await?;

        if self.with_store(|s| s.get_conflict(note_id)).await?.is_some() {
            self.with_store(|s| s.delete_conflict(note_id)).await?;
            self.update_metadata(|m| m.conflict_count = m.conflict_count.saturating_sub(1))
                .await?;
            self.bus.emit(&SyncEvent::ConflictResolved {
                note_id: note_id.to_string(),
            });
        }
        info!(note_id, "note deleted");
        Ok(())
    }

    /// Ingests an event pushed by the remote.
    ///
    /// Remote edits are applied only to local copies with no unsynced
    /// changes; otherwise the note is marked pending and reconciled by the
    /// next pass. Events arriving during a pass are deferred the same way.
    pub async fn handle_remote_event(&self, event: &SyncEvent) -> EngineResult<RemoteEventOutcome> {
        match event {
            SyncEvent::SyncRequired { reason } => {
                info!(%reason, "remote requested a sync pass");
                return Ok(RemoteEventOutcome::SyncRequested);
            }
            SyncEvent::NoteUpdated(_) | SyncEvent::NoteDeleted { .. } => {}
            _ => return Ok(RemoteEventOutcome::Ignored),
        }

        let Some(_guard) = self.try_begin() else {
            debug!("sync pass in progress; deferring remote event");
            return Ok(RemoteEventOutcome::Deferred);
        };

        match event {
            SyncEvent::NoteUpdated(remote) => self.apply_remote_update(remote).await,
            SyncEvent::NoteDeleted { note_id } => self.apply_remote_delete(note_id).await,
            _ => Ok(RemoteEventOutcome::Ignored),
        }
    }

    async fn apply_remote_update(&self, remote: &Note) -> EngineResult<RemoteEventOutcome> {
        let now = self.clock.now();
        let Some(local) = self.with_store(|s| s.get_note(&remote.id)).await? else {
            self.pull_new(remote.clone(), now).await?;
            return Ok(RemoteEventOutcome::Applied);
        };

        if local
            .last_synced_at
            .is_some_and(|synced| remote.updated_at <= synced)
        {
            return Ok(RemoteEventOutcome::Ignored);
        }

        if local.changed_since_sync() || local.sync_status == SyncStatus::Conflict {
            debug!(note_id = %local.id, "local copy has unsynced edits; deferring remote update");
            self.mark_pending_note(local).await?;
            return Ok(RemoteEventOutcome::Deferred);
        }

        self.pull(&local, remote, now).await?;
        Ok(RemoteEventOutcome::Applied)
    }

    async fn apply_remote_delete(&self, note_id: &str) -> EngineResult<RemoteEventOutcome> {
        let Some(local) = self.with_store(|s| s.get_note(note_id)).await? else {
            return Ok(RemoteEventOutcome::Ignored);
        };
        if local.last_synced_at.is_none() {
            return Ok(RemoteEventOutcome::Ignored);
        }

        if local.changed_since_sync() || local.sync_status == SyncStatus::Conflict {
            debug!(note_id, "local copy has unsynced edits; deferring remote delete");
            self.mark_pending_note(local).await?;
            return Ok(RemoteEventOutcome::Deferred);
        }

        self.delete_local(note_id).await?;
        Ok(RemoteEventOutcome::Applied)
    }
}

/// The local copy after taking the remote payload wholesale.
fn pulled_copy(working: &Note, remote: &Note, now: DateTime<Utc>) -> Note {
    let mut pulled = remote.clone();
    pulled.sync_status = SyncStatus::Synced;
    pulled.last_synced_at = Some(now);
    pulled.local_version = working.local_version.max(remote.local_version);
    pulled.remote_version = working.remote_version.max(remote.remote_version);
    pulled
}

fn note_error(note_id: String, error: &SyncError) -> NoteError {
    NoteError {
        note_id,
        error: error.to_string(),
        retryable: error.is_retryable(),
    }
}
