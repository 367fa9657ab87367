//! # notesync Engine
//!
//! Offline-first sync for notes.
//!
//! This crate provides:
//! - A conflict-resolving sync engine (`local`, `remote` and `manual` strategies)
//! - Retry with exponential backoff and jitter
//! - A resilient duplex connection manager (heartbeat, bounded reconnect)
//! - A typed in-process notification bus
//! - Local Store bindings (in-memory, JSON files) and remote bindings
//!   (HTTP, a remote simulated on a second store)
//!
//! ## Architecture
//!
//! A sync pass fetches one remote snapshot and reconciles each local note
//! against it independently:
//! 1. A note changed on one side only is applied cleanly (push or pull)
//! 2. A note changed on both sides since its last sync is a conflict
//! 3. Conflicts are resolved by the chosen strategy, or stored for the user
//!
//! The connection manager carries pushed remote events (`note_update`,
//! `note_delete`, `sync_required`) onto the bus, where they can be fed to
//! [`SyncEngine::handle_remote_event`].
//!
//! ## Key Invariants
//!
//! - At most one sync pass runs per engine
//! - Per-note failures never abort the batch
//! - The winning copy of a conflict is never partially merged
//! - Metadata reflects the last completed pass only
//! - Every scheduled connection task is cancelled on disconnect

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bus;
mod channel;
mod clock;
mod config;
mod connection;
mod engine;
mod error;
mod file_store;
mod http;
mod memory;
mod retry;
mod store;
mod transport;
mod websocket;

pub use bus::{EventKind, NotificationBus, SubscriptionId, SyncEvent};
pub use channel::{Channel, ChannelPeer, Connector, Inbound, Outbound};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConnectionConfig, RetryConfig, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use engine::{RemoteEventOutcome, SyncEngine};
pub use error::{EngineResult, ErrorKind, SyncError};
pub use file_store::JsonFileStore;
pub use http::HttpRemote;
pub use memory::{InjectedFailure, MemoryStore};
pub use retry::{RetryPolicy, Retryable};
pub use store::{LocalStore, StoreError, StoreResult};
pub use transport::{RemoteNotes, StoreRemote};
pub use websocket::WebSocketConnector;
