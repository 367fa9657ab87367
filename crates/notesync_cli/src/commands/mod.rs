//! CLI command implementations.

pub mod add;
pub mod conflicts;
pub mod listen;
pub mod resolve;
pub mod status;
pub mod sync;

use chrono::{DateTime, Utc};
use notesync_engine::{
    EngineResult, HttpRemote, JsonFileStore, NotificationBus, RemoteNotes, StoreRemote,
    SyncConfig, SyncEngine, SystemClock,
};
use notesync_protocol::Note;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Where the remote lives.
pub enum RemoteTarget {
    /// A remote simulated on a second notes directory.
    Dir(PathBuf),
    /// An HTTP notes API.
    Url {
        /// Base URL.
        url: String,
        /// Bearer token.
        token: Option<String>,
    },
}

/// A remote chosen at run time.
pub enum AnyRemote {
    /// Directory-backed remote.
    Dir(StoreRemote<JsonFileStore>),
    /// HTTP remote.
    Http(HttpRemote),
}

impl AnyRemote {
    /// Opens the remote described by `target`.
    pub fn open(target: RemoteTarget) -> CliResult<Self> {
        Ok(match target {
            RemoteTarget::Dir(dir) => AnyRemote::Dir(StoreRemote::new(JsonFileStore::open(&dir)?)),
            RemoteTarget::Url { url, token } => {
                let remote = HttpRemote::new(url)?;
                AnyRemote::Http(match token {
                    Some(token) => remote.with_auth_token(token),
                    None => remote,
                })
            }
        })
    }
}

impl RemoteNotes for AnyRemote {
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> EngineResult<Vec<Note>> {
        match self {
            AnyRemote::Dir(remote) => remote.fetch_since(since).await,
            AnyRemote::Http(remote) => remote.fetch_since(since).await,
        }
    }

    async fn push_note(&self, note: &Note) -> EngineResult<Note> {
        match self {
            AnyRemote::Dir(remote) => remote.push_note(note).await,
            AnyRemote::Http(remote) => remote.push_note(note).await,
        }
    }

    async fn push_deletion(&self, note_id: &str) -> EngineResult<()> {
        match self {
            AnyRemote::Dir(remote) => remote.push_deletion(note_id).await,
            AnyRemote::Http(remote) => remote.push_deletion(note_id).await,
        }
    }
}

/// The engine used by the CLI.
pub type CliEngine = SyncEngine<AnyRemote, Arc<JsonFileStore>>;

/// Opens the local notes directory.
pub fn open_local(path: &Path) -> CliResult<Arc<JsonFileStore>> {
    Ok(Arc::new(JsonFileStore::open(path)?))
}

/// Builds an engine over the local directory and `target`.
pub fn open_engine(
    path: &Path,
    target: RemoteTarget,
    bus: Arc<NotificationBus>,
) -> CliResult<CliEngine> {
    Ok(SyncEngine::new(
        SyncConfig::default(),
        AnyRemote::open(target)?,
        open_local(path)?,
        Arc::new(SystemClock),
        bus,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_engine::LocalStore;
    use notesync_protocol::ResolutionStrategy;

    #[tokio::test]
    async fn directory_remote_receives_added_note() {
        let local_dir = tempfile::tempdir().unwrap();
        let remote_dir = tempfile::tempdir().unwrap();
        add::run(local_dir.path(), "hello", "world", vec!["inbox".into()]).unwrap();

        let engine = open_engine(
            local_dir.path(),
            RemoteTarget::Dir(remote_dir.path().to_path_buf()),
            Arc::new(NotificationBus::new()),
        )
        .unwrap();
        assert_eq!(engine.get_sync_metadata().await.unwrap().pending_sync_count, 1);

        let result = sync::pass(&engine, ResolutionStrategy::Local).await.unwrap();
        assert_eq!(result.synced_notes.len(), 1);
        assert_eq!(engine.get_sync_metadata().await.unwrap().pending_sync_count, 0);

        let remote = JsonFileStore::open(remote_dir.path()).unwrap();
        let notes = remote.all_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "hello");
        assert_eq!(notes[0].tags, vec!["inbox".to_string()]);
    }
}
