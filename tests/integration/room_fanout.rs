//! Integration tests for room join and chat fan-out.
//!
//! Drives the relay server end-to-end over real WebSocket connections and
//! verifies the fan-out contract: chat messages reach every member of the
//! sender's room (sender included), nothing leaks across rooms, and a
//! connection that misbehaves keeps being served.

use std::time::Duration;

use chatzone_proto::frame::{self, ClientFrame, ServerFrame};
use chatzone_relay::relay;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite;

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Starts the relay server on an OS-assigned port.
async fn start_server() -> std::net::SocketAddr {
    let (addr, _handle) = relay::start_server("127.0.0.1:0")
        .await
        .expect("failed to start relay server");
    addr
}

/// Connects a WebSocket client to the relay.
async fn connect(addr: std::net::SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws
}

/// Sends a client frame as a WebSocket text message.
async fn send_frame(ws: &mut WsClient, client_frame: &ClientFrame) {
    let json = frame::encode_client(client_frame).unwrap();
    ws.send(tungstenite::Message::Text(json.into()))
        .await
        .unwrap();
}

/// Joins a room and consumes the confirmation notice.
async fn join(ws: &mut WsClient, room: &str, username: &str) {
    send_frame(
        ws,
        &ClientFrame::Join {
            room_id: Some(room.to_string()),
            username: Some(username.to_string()),
        },
    )
    .await;
    assert_eq!(
        recv_frame(ws).await,
        ServerFrame::system(format!("You joined room {room}"))
    );
}

/// Sends a chat message.
async fn send_chat(ws: &mut WsClient, message: &str) {
    send_frame(
        ws,
        &ClientFrame::Chat {
            message: Some(message.to_string()),
        },
    )
    .await;
}

/// Receives the next server frame, failing the test after a timeout.
async fn recv_frame(ws: &mut WsClient) -> ServerFrame {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed")
        .expect("websocket error");
    frame::decode_server(msg.to_text().unwrap()).unwrap()
}

/// Asserts that no frame arrives within a short grace period.
async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

// ---------------------------------------------------------------------------
// Join and announcement flow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_announces_to_existing_members_only() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "lobby", "alice").await;
    join(&mut bob, "lobby", "bob").await;

    // Alice hears about bob; bob does not hear about himself.
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::system("bob has joined the room")
    );
    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn join_in_another_room_is_not_announced() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "red", "alice").await;
    join(&mut bob, "blue", "bob").await;

    assert_silent(&mut alice).await;
}

// ---------------------------------------------------------------------------
// Chat fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_reaches_whole_room_including_sender() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "lobby", "alice").await;
    join(&mut bob, "lobby", "bob").await;
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::system("bob has joined the room")
    );

    send_chat(&mut alice, "hi").await;

    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::member("alice", "hi")
    );
    assert_eq!(
        recv_frame(&mut bob).await,
        ServerFrame::member("alice", "hi")
    );
}

#[tokio::test]
async fn chat_does_not_cross_rooms() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "red", "alice").await;
    join(&mut bob, "blue", "bob").await;

    send_chat(&mut alice, "hi").await;

    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::member("alice", "hi")
    );
    assert_silent(&mut bob).await;
}

// ---------------------------------------------------------------------------
// Error paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chat_before_join_is_rejected_with_notice() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;

    send_chat(&mut alice, "anyone?").await;

    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::system("You need to join a room before sending messages.")
    );
    assert_silent(&mut alice).await;
}

#[tokio::test]
async fn malformed_frame_gets_notice_and_connection_survives() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;

    alice
        .send(tungstenite::Message::Text("definitely not json".into()))
        .await
        .unwrap();
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::system("Error processing your message. Please try again.")
    );

    // The connection is still served afterwards.
    join(&mut alice, "lobby", "alice").await;
    send_chat(&mut alice, "recovered").await;
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::member("alice", "recovered")
    );
}

#[tokio::test]
async fn one_client_failure_does_not_affect_others() {
    let addr = start_server().await;
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    join(&mut alice, "lobby", "alice").await;
    join(&mut bob, "lobby", "bob").await;
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::system("bob has joined the room")
    );

    // Bob sends garbage; alice's session is unaffected.
    bob.send(tungstenite::Message::Text("{{{{".into()))
        .await
        .unwrap();
    assert_eq!(
        recv_frame(&mut bob).await,
        ServerFrame::system("Error processing your message. Please try again.")
    );

    send_chat(&mut alice, "still here").await;
    assert_eq!(
        recv_frame(&mut alice).await,
        ServerFrame::member("alice", "still here")
    );
    assert_eq!(
        recv_frame(&mut bob).await,
        ServerFrame::member("alice", "still here")
    );
}

// ---------------------------------------------------------------------------
// HTTP surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_endpoint_reports_running() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let addr = start_server().await;
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET / HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    assert!(response.contains("ChatZone relay server is running"));
}
