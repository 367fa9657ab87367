//! Error types for wire decoding.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding frames.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The frame is not a valid JSON envelope.
    #[error("invalid frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload does not match its message type.
    #[error("invalid payload for {kind}: {message}")]
    InvalidPayload {
        /// Message type.
        kind: String,
        /// Decoder message.
        message: String,
    },
}
