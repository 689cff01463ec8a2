//! Per-connection session management.
//!
//! Each WebSocket gets a Session with its own [`ConnId`]. The session's
//! reader loop decodes frames and hands events to the relay one at a time,
//! so a connection's events are processed in the order it sent them. A
//! separate writer task drains the connection's queue onto the socket.

use crate::error::ClientError;
use crate::protocol::WsRelay;
use crate::server::Admission;
use crate::transport::ChannelTransport;
use axum::extract::ws::{Message, WebSocket};
use drop_types::{ConnId, Frame, Outbound};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A per-connection session.
pub struct Session {
    relay: Arc<WsRelay>,
    conn: ConnId,
    remote: SocketAddr,
    _admission: Admission<ChannelTransport>,
}

impl Session {
    /// Create a new session for a connection from `remote`.
    ///
    /// The session holds `admission` until it ends.
    pub fn new(
        relay: Arc<WsRelay>,
        remote: SocketAddr,
        admission: Admission<ChannelTransport>,
    ) -> Self {
        Self {
            relay,
            conn: ConnId::random(),
            remote,
            _admission: admission,
        }
    }

    /// Run the session until the socket closes.
    pub async fn run(self, socket: WebSocket) {
        tracing::info!("New connection from {} as {:?}", self.remote, self.conn);

        let (sink, mut stream) = socket.split();
        let outbound = self.relay.transport().register(self.conn);
        let writer = tokio::spawn(write_loop(self.conn, sink, outbound));

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_text(&text).await,
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => self.handle_text(&text).await,
                    Err(_) => {
                        self.relay
                            .reject(
                                self.conn,
                                ClientError::BadRequest("frame is not UTF-8".to_string()),
                            )
                            .await
                    }
                },
                Ok(Message::Close(_)) => break,
                // axum answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    tracing::debug!("Connection {:?} read error: {}", self.conn, e);
                    break;
                }
            }
        }

        // Cleanup. Aborting the writer drops the queue, which fails any
        // peer still waiting for room in it.
        self.relay.transport().unregister(&self.conn);
        writer.abort();
        self.relay.disconnect(self.conn).await;

        tracing::info!("Connection {:?} from {} closed", self.conn, self.remote);
    }

    async fn handle_text(&self, text: &str) {
        match Frame::decode_inbound(text) {
            Ok(event) => {
                tracing::debug!("{:?} sent {}", self.conn, event.name());
                self.relay.dispatch(self.conn, event).await;
            }
            Err(e) => {
                self.relay
                    .reject(self.conn, ClientError::BadRequest(e.to_string()))
                    .await;
            }
        }
    }
}

/// Drain `outbound` onto the socket until the queue or the socket closes.
async fn write_loop(
    conn: ConnId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(event) = outbound.recv().await {
        let text = match Frame::encode_outbound(&event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode {} for {:?}: {}", event.name(), conn, e);
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!("Connection {:?} write error: {}", conn, e);
            break;
        }
    }

    let _ = sink.close().await;
}
