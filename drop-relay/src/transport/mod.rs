//! Transport abstraction for codedrop-relay.
//!
//! The relay core never touches sockets. It hands outbound events to a
//! [`Transport`] addressed by [`ConnId`], and the transport gets them onto
//! the right connection.
//!
//! # Implementations
//!
//! - [`ChannelTransport`]: one bounded queue per live connection, drained
//!   by that connection's writer task (used by the WebSocket host)
//! - [`MockTransport`]: records every delivery for assertions in tests

mod channel;
mod mock;

pub use channel::{ChannelTransport, DEFAULT_QUEUE_SIZE};
pub use mock::MockTransport;

use async_trait::async_trait;
use drop_types::{ConnId, Outbound};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No live connection with this id.
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnId),

    /// Connection is closing and no longer accepts events.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Delivers relay events to connections.
///
/// Implementations must be cheap to call concurrently; the relay calls
/// `send` from many connection tasks at once and never while holding its
/// own lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `event` to `conn`.
    ///
    /// May wait until `conn` has room for the event.
    async fn send(&self, conn: ConnId, event: Outbound) -> Result<(), TransportError>;

    /// Number of live connections known to the transport.
    fn connection_count(&self) -> usize;
}
