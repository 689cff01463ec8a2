//! Mock transport for testing.
//!
//! Captures delivered events for verification and can be told to fail.

use super::{Transport, TransportError};
use async_trait::async_trait;
use drop_types::{ConnId, Outbound};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Mock transport for testing.
///
/// Every delivery is recorded in order. Connections marked closed make
/// `send` fail, to exercise delivery-failure paths.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    sent: Vec<(ConnId, Outbound)>,
    closed: HashSet<ConnId>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries so far, in order.
    pub fn sent(&self) -> Vec<(ConnId, Outbound)> {
        let inner = self.inner.lock().unwrap();
        inner.sent.clone()
    }

    /// Events delivered to one connection, in order.
    pub fn sent_to(&self, conn: ConnId) -> Vec<Outbound> {
        let inner = self.inner.lock().unwrap();
        inner
            .sent
            .iter()
            .filter(|(to, _)| *to == conn)
            .map(|(_, event)| event.clone())
            .collect()
    }

    /// Last event delivered to `conn`.
    pub fn last_sent_to(&self, conn: ConnId) -> Option<Outbound> {
        self.sent_to(conn).pop()
    }

    /// Make every later send to `conn` fail.
    pub fn close(&self, conn: ConnId) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed.insert(conn);
    }

    /// Forget recorded deliveries.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.sent.clear();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, conn: ConnId, event: Outbound) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed.contains(&conn) {
            return Err(TransportError::ConnectionClosed);
        }
        inner.sent.push((conn, event));
        Ok(())
    }

    fn connection_count(&self) -> usize {
        0
    }
}
