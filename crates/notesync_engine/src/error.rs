//! Error types for the sync engine.

use crate::store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Broad classification used by retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying after a delay.
    Transient,
    /// Retrying cannot help.
    Permanent,
}

/// Errors that can occur during sync and connection operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Channel did not open within the connect timeout.
    #[error("connection attempt timed out")]
    ConnectionTimeout,

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection attempt superseded by a disconnect or a newer connect.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed data from the remote.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Input rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Resource does not exist on the remote.
    #[error("not found: {0}")]
    NotFound(String),

    /// Remote storage is full.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// No stored conflict for the note.
    #[error("no unresolved conflict for note {note_id}")]
    ConflictNotFound {
        /// Note ID.
        note_id: String,
    },

    /// A sync pass is already running.
    #[error("a sync pass is already in progress")]
    SyncInProgress,

    /// Sync is switched off in the metadata.
    #[error("sync is disabled")]
    SyncDisabled,

    /// Failure carrying no classification.
    #[error("{0}")]
    Opaque(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::ConnectionTimeout | SyncError::NotConnected => true,
            SyncError::Store(e) => e.is_transient(),
            SyncError::Opaque(_) => true,
            _ => false,
        }
    }

    /// Returns the retry classification.
    pub fn kind(&self) -> ErrorKind {
        if self.is_retryable() {
            ErrorKind::Transient
        } else {
            ErrorKind::Permanent
        }
    }
}

impl From<notesync_protocol::ProtocolError> for SyncError {
    fn from(err: notesync_protocol::ProtocolError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
