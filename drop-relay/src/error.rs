//! Error types for codedrop-relay.

use drop_types::{Code, Outbound};

/// Slot registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Code is not part of the registry.
    #[error("slot not found: {code}")]
    NotFound {
        /// The code that was looked up.
        code: Code,
    },

    /// Slot is not in a state that allows the operation.
    #[error("slot {code} is {state}, cannot {operation}")]
    InvalidState {
        /// The slot's code.
        code: Code,
        /// State the slot was in.
        state: &'static str,
        /// Operation that was refused.
        operation: &'static str,
    },

    /// Every slot is allocated.
    #[error("no free slots")]
    ResourceExhausted,
}

/// Session index errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Connection holds no slot.
    #[error("connection is not bound to a slot")]
    NotBound,
}

/// Errors reported back to a client as a `servererror` event.
///
/// None of these end the connection or affect any other connection's slot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// `request_from_slot` without a code.
    #[error("No slot specified")]
    NoSlot,

    /// Code is not part of the code space.
    #[error("Bad slot specified")]
    BadSlot,

    /// Code is free, already paired, or the connection's binding is stale.
    #[error("that code has expired or already run out; ask the sender to resend")]
    OldSlot,

    /// Claim gave up after its bounded retries.
    #[error("no codes are available right now; try again shortly")]
    SlotsExhausted,

    /// The other side of the slot went away.
    #[error("the other device disconnected")]
    PeerDisconnected,

    /// Connection is sending too fast.
    #[error("too many requests; slow down")]
    RateLimited,

    /// Frame could not be decoded.
    #[error("could not understand request: {0}")]
    BadRequest(String),
}

impl ClientError {
    /// Machine-readable error code for the `servererror` event.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSlot => "no_slot",
            Self::BadSlot => "bad_slot",
            Self::OldSlot => "old_slot",
            Self::SlotsExhausted => "slots_exhausted",
            Self::PeerDisconnected => "peer_disconnected",
            Self::RateLimited => "rate_limited",
            Self::BadRequest(_) => "bad_request",
        }
    }

    /// Build the `servererror` event for this error.
    pub fn to_outbound(&self) -> Outbound {
        Outbound::server_error(self.code(), self.to_string())
    }
}

impl From<SessionError> for ClientError {
    fn from(_: SessionError) -> Self {
        Self::OldSlot
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type alias for operations whose failure is reported to the client.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
