//! End-to-end tests over a real WebSocket.

use codedrop_relay::config::Config;
use codedrop_relay::http::build_router;
use codedrop_relay::protocol::WsRelay;
use codedrop_relay::registry::SlotState;
use codedrop_relay::transport::ChannelTransport;
use drop_types::{Code, Frame, Outbound};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_relay(config: Config) -> (SocketAddr, Arc<WsRelay>) {
    let relay = Arc::new(WsRelay::new(config, Arc::new(ChannelTransport::new())));
    let app = build_router(Arc::clone(&relay));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, relay)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, text: &str) {
    ws.send(Message::text(text)).await.unwrap();
}

async fn recv_text(ws: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return text.as_str().to_owned();
        }
    }
}

async fn recv(ws: &mut Client) -> Outbound {
    Frame::decode_outbound(&recv_text(ws).await).unwrap()
}

async fn recv_error_code(ws: &mut Client) -> String {
    match recv(ws).await {
        Outbound::ServerError { code, .. } => code,
        other => panic!("expected servererror, got {:?}", other),
    }
}

async fn claim(ws: &mut Client) -> Code {
    send(ws, r#"{"event":"request_slot"}"#).await;
    match recv(ws).await {
        Outbound::SlotAnswer { slot } => slot,
        other => panic!("expected slot_answer, got {:?}", other),
    }
}

async fn join(ws: &mut Client, code: Code) {
    send(
        ws,
        &format!(r#"{{"event":"request_from_slot","data":{{"slot":"{}"}}}}"#, code),
    )
    .await;
}

/// Wait until the relay has processed a disconnect.
async fn wait_for_state(relay: &WsRelay, code: &Code, state: SlotState) {
    for _ in 0..100 {
        if relay.pairing().state(code) == Some(state) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("slot {} never reached {:?}", code, state);
}

#[tokio::test]
async fn full_transfer_over_websocket() {
    let (addr, relay) = start_relay(Config::default()).await;
    let mut sender = connect(addr).await;
    let mut receiver = connect(addr).await;

    let code = claim(&mut sender).await;
    join(&mut receiver, code).await;
    assert_eq!(recv(&mut sender).await, Outbound::TransmitNow);

    send(
        &mut sender,
        r#"{"event":"transmission","data":{"name": "notes.txt", "size":5}}"#,
    )
    .await;
    send(
        &mut sender,
        r#"{"event":"transmission","data":{"chunk":"aGVsbG8=","seq":0}}"#,
    )
    .await;

    assert_eq!(
        recv_text(&mut receiver).await,
        r#"{"event":"transmission","data":{"name": "notes.txt", "size":5}}"#
    );
    assert_eq!(
        recv_text(&mut receiver).await,
        r#"{"event":"transmission","data":{"chunk":"aGVsbG8=","seq":0}}"#
    );

    send(&mut receiver, r#"{"event":"got_all"}"#).await;
    assert_eq!(recv(&mut sender).await, Outbound::GotAll);

    wait_for_state(&relay, &code, SlotState::Free).await;
}

#[tokio::test]
async fn receiver_leaving_notifies_sender() {
    let (addr, relay) = start_relay(Config::default()).await;
    let mut sender = connect(addr).await;
    let mut receiver = connect(addr).await;

    let code = claim(&mut sender).await;
    join(&mut receiver, code).await;
    assert_eq!(recv(&mut sender).await, Outbound::TransmitNow);

    receiver.close(None).await.unwrap();
    assert_eq!(recv_error_code(&mut sender).await, "peer_disconnected");
    wait_for_state(&relay, &code, SlotState::Free).await;

    send(&mut sender, r#"{"event":"transmission","data":"late"}"#).await;
    assert_eq!(recv_error_code(&mut sender).await, "old_slot");
}

#[tokio::test]
async fn sender_leaving_before_join_frees_code() {
    let (addr, relay) = start_relay(Config::default()).await;
    let mut sender = connect(addr).await;
    let code = claim(&mut sender).await;

    sender.close(None).await.unwrap();
    wait_for_state(&relay, &code, SlotState::Free).await;

    let mut late = connect(addr).await;
    join(&mut late, code).await;
    assert_eq!(recv_error_code(&mut late).await, "old_slot");
}

#[tokio::test]
async fn bad_requests_get_errors_and_keep_the_connection() {
    let (addr, _relay) = start_relay(Config::default()).await;
    let mut client = connect(addr).await;

    send(&mut client, "not json").await;
    assert_eq!(recv_error_code(&mut client).await, "bad_request");

    send(&mut client, r#"{"event":"launch_rockets"}"#).await;
    assert_eq!(recv_error_code(&mut client).await, "bad_request");

    send(&mut client, r#"{"event":"request_from_slot"}"#).await;
    assert_eq!(recv_error_code(&mut client).await, "no_slot");

    send(
        &mut client,
        r#"{"event":"request_from_slot","data":{"slot":"QQQQ"}}"#,
    )
    .await;
    assert_eq!(recv_error_code(&mut client).await, "bad_slot");

    // still usable afterwards
    claim(&mut client).await;
}

#[tokio::test]
async fn health_reports_open_connections() {
    let (addr, relay) = start_relay(Config::default()).await;
    let mut client = connect(addr).await;
    claim(&mut client).await;

    assert_eq!(relay.active_connections(), 1);
    assert_eq!(relay.stats().allocated, 1);
}

#[tokio::test]
async fn connection_cap_is_enforced_and_released() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let (addr, relay) = start_relay(config).await;

    let mut first = connect(addr).await;
    assert!(connect_async(format!("ws://{}/ws", addr)).await.is_err());

    first.close(None).await.unwrap();
    for _ in 0..100 {
        if relay.admitted_connections() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(relay.admitted_connections(), 0);

    let mut second = connect(addr).await;
    claim(&mut second).await;
}
