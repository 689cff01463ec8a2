//! Error types for codedrop wire handling.

use thiserror::Error;

/// Errors that can occur while encoding or decoding codedrop frames.
#[derive(Debug, Error)]
pub enum DropError {
    /// JSON encoding failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON decoding failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Event name not part of the protocol
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// Event is known but its data has the wrong shape
    #[error("invalid data for {event}: {reason}")]
    InvalidData {
        /// Event name
        event: &'static str,
        /// What was wrong with it
        reason: String,
    },
}
