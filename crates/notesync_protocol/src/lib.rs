//! # notesync protocol
//!
//! Data types shared by the notesync engine and its collaborators.
//!
//! This crate provides:
//! - `Note` and its `SyncStatus`
//! - `SyncConflict` and the `reconcile` detection rule
//! - `SyncResult` and `SyncMetadata`
//! - The `{type, payload, timestamp}` wire envelope
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod messages;
mod metadata;
mod note;
mod result;

pub use conflict::{reconcile, ConflictType, Reconciliation, ResolutionStrategy, SyncConflict};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{Envelope, InboundMessage, NOTE_DELETE, NOTE_UPDATE, PING, PONG, SYNC_REQUIRED};
pub use metadata::SyncMetadata;
pub use note::{Note, SyncStatus};
pub use result::{NoteError, SyncResult};
