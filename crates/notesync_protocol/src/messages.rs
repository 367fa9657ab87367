//! Wire messages for the duplex channel.
//!
//! Every frame is a JSON envelope `{ "type", "payload", "timestamp" }`.

use crate::error::{ProtocolError, ProtocolResult};
use crate::note::Note;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Heartbeat request.
pub const PING: &str = "ping";
/// Heartbeat response.
pub const PONG: &str = "pong";
/// A note was created or updated remotely.
pub const NOTE_UPDATE: &str = "note_update";
/// A note was deleted remotely.
pub const NOTE_DELETE: &str = "note_delete";
/// The remote asks the client to run a sync pass.
pub const SYNC_REQUIRED: &str = "sync_required";

/// A tagged frame on the duplex channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Send time.
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(kind: impl Into<String>, payload: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            timestamp,
        }
    }

    /// Creates a heartbeat ping.
    pub fn ping(now: DateTime<Utc>) -> Self {
        Self::new(PING, json!({ "timestamp": now.timestamp_millis() }), now)
    }

    /// Creates a heartbeat pong.
    pub fn pong(now: DateTime<Utc>) -> Self {
        Self::new(PONG, json!({ "timestamp": now.timestamp_millis() }), now)
    }

    /// Encodes to a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes from a JSON text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteDeletePayload {
    note_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncRequiredPayload {
    #[serde(default)]
    reason: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat request.
    Ping,
    /// Heartbeat response.
    Pong,
    /// Full note pushed by the remote.
    NoteUpdate(Note),
    /// Note deleted remotely.
    NoteDelete {
        /// Note ID.
        note_id: String,
    },
    /// Remote asks for a sync pass.
    SyncRequired {
        /// Why the remote wants a sync.
        reason: String,
    },
    /// Unrecognised message type.
    Unknown(String),
}

impl InboundMessage {
    /// Interprets the payload of an envelope according to its type.
    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Self> {
        let Envelope { kind, payload, .. } = envelope;
        let payload_error = |e: serde_json::Error| ProtocolError::InvalidPayload {
            kind: kind.clone(),
            message: e.to_string(),
        };

        match kind.as_str() {
            PING => Ok(Self::Ping),
            PONG => Ok(Self::Pong),
            NOTE_UPDATE => serde_json::from_value(payload)
                .map(Self::NoteUpdate)
                .map_err(payload_error),
            NOTE_DELETE => serde_json::from_value::<NoteDeletePayload>(payload)
                .map(|p| Self::NoteDelete { note_id: p.note_id })
                .map_err(payload_error),
            SYNC_REQUIRED => {
                let p: SyncRequiredPayload =
                    serde_json::from_value(payload).map_err(payload_error)?;
                Ok(Self::SyncRequired {
                    reason: p.reason.unwrap_or_default(),
                })
            }
            _ => Ok(Self::Unknown(kind)),
        }
    }

    /// Decodes a text frame.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    /// Returns the wire type name.
    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => PING,
            Self::Pong => PONG,
            Self::NoteUpdate(_) => NOTE_UPDATE,
            Self::NoteDelete { .. } => NOTE_DELETE,
            Self::SyncRequired { .. } => SYNC_REQUIRED,
            Self::Unknown(kind) => kind,
        }
    }
}
