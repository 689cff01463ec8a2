//! Channel-backed transport.
//!
//! Each connection registers a bounded queue; its writer task owns the
//! receiving end and writes events to the socket in order. A full queue makes
//! `send` wait, so a slow reader slows down whoever is sending to it instead
//! of piling payload up in the relay.

use super::{Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use drop_types::{ConnId, Outbound};
use tokio::sync::mpsc;

/// Default number of events queued per connection.
pub const DEFAULT_QUEUE_SIZE: usize = 16;

/// Routes events to per-connection queues.
#[derive(Debug)]
pub struct ChannelTransport {
    connections: DashMap<ConnId, mpsc::Sender<Outbound>>,
    queue_size: usize,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::with_queue_size(DEFAULT_QUEUE_SIZE)
    }
}

impl ChannelTransport {
    /// Create a transport with no connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport whose per-connection queues hold `queue_size`
    /// events (at least 1).
    pub fn with_queue_size(queue_size: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_size: queue_size.max(1),
        }
    }

    /// Register a new connection and return the queue its writer drains.
    pub fn register(&self, conn: ConnId) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.queue_size);
        self.connections.insert(conn, tx);
        rx
    }

    /// Forget a connection. Events sent to it afterwards fail.
    pub fn unregister(&self, conn: &ConnId) {
        self.connections.remove(conn);
    }

    /// Whether `conn` is registered.
    pub fn contains(&self, conn: &ConnId) -> bool {
        self.connections.contains_key(conn)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, conn: ConnId, event: Outbound) -> Result<(), TransportError> {
        // Clone the sender out so the map shard is not held across the send.
        let tx = self
            .connections
            .get(&conn)
            .map(|entry| entry.value().clone())
            .ok_or(TransportError::UnknownConnection(conn))?;

        tx.send(event)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_to_registered_connection() {
        let transport = ChannelTransport::new();
        let conn = ConnId::random();
        let mut rx = transport.register(conn);

        transport.send(conn, Outbound::TransmitNow).await.unwrap();
        transport.send(conn, Outbound::GotAll).await.unwrap();

        assert_eq!(rx.recv().await, Some(Outbound::TransmitNow));
        assert_eq!(rx.recv().await, Some(Outbound::GotAll));
        assert_eq!(transport.connection_count(), 1);
    }

    #[tokio::test]
    async fn unknown_connection_fails() {
        let transport = ChannelTransport::new();
        let conn = ConnId::random();

        let err = transport.send(conn, Outbound::GotAll).await.unwrap_err();
        assert!(matches!(err, TransportError::UnknownConnection(c) if c == conn));
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let transport = ChannelTransport::new();
        let conn = ConnId::random();
        let _rx = transport.register(conn);
        assert!(transport.contains(&conn));

        transport.unregister(&conn);
        assert!(!transport.contains(&conn));
        assert!(transport.send(conn, Outbound::GotAll).await.is_err());
        assert_eq!(transport.connection_count(), 0);
    }

    #[tokio::test]
    async fn dropped_writer_reports_closed() {
        let transport = ChannelTransport::new();
        let conn = ConnId::random();
        drop(transport.register(conn));

        let err = transport.send(conn, Outbound::GotAll).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn full_queue_holds_the_sender_back() {
        let transport = Arc::new(ChannelTransport::with_queue_size(2));
        let conn = ConnId::random();
        let mut rx = transport.register(conn);

        transport.send(conn, Outbound::TransmitNow).await.unwrap();
        transport.send(conn, Outbound::TransmitNow).await.unwrap();

        let blocked = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.send(conn, Outbound::GotAll).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        assert_eq!(rx.recv().await, Some(Outbound::TransmitNow));
        blocked.await.unwrap().unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::TransmitNow));
        assert_eq!(rx.recv().await, Some(Outbound::GotAll));
    }

    #[tokio::test]
    async fn waiting_sender_fails_when_the_writer_goes_away() {
        let transport = Arc::new(ChannelTransport::with_queue_size(1));
        let conn = ConnId::random();
        let rx = transport.register(conn);
        transport.send(conn, Outbound::TransmitNow).await.unwrap();

        let blocked = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move { transport.send(conn, Outbound::GotAll).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(rx);

        let err = blocked.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[test]
    fn zero_queue_size_is_clamped() {
        let transport = ChannelTransport::with_queue_size(0);
        let _rx = transport.register(ConnId::random());
        assert_eq!(transport.queue_size, 1);
    }
}
