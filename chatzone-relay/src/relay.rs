//! Relay server core: shared state, WebSocket handler, and room fan-out
//! routing.
//!
//! The relay accepts WebSocket connections and interprets JSON frames from
//! each one. A connection starts unjoined; a valid `join` frame places it in
//! the registry under a room and display name, after which its chat messages
//! and typing indicators fan out to the other connections in the same room.
//! Disconnect is the only teardown trigger: the registry entry is removed
//! and the former room is told the member left.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chatzone_proto::frame::{self, ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::registry::{ConnId, Participant, Registry};

/// Notice sent when a frame cannot be decoded at all.
const PARSE_ERROR_NOTICE: &str = "Error processing your message. Please try again.";

/// Notice sent when an unjoined connection attempts to chat.
const JOIN_FIRST_NOTICE: &str = "You need to join a room before sending messages.";

/// Shared relay server state holding the connection registry.
pub struct RelayState {
    /// Registry of joined connections.
    pub registry: Registry,
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayState {
    /// Creates a new relay state with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }
}

/// Handles an upgraded WebSocket connection for its whole lifetime.
///
/// The connection lifecycle:
/// 1. Allocate a connection id and an outbound channel.
/// 2. Spawn a writer task draining the channel into the socket.
/// 3. Read inbound frames in arrival order, routing each through the
///    registry.
/// 4. On disconnect, remove the registry entry and announce the leave.
pub async fn handle_socket(socket: WebSocket, state: Arc<RelayState>) {
    let conn = state.registry.next_conn_id();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    tracing::debug!(conn = %conn, "connection established");

    // Writer task: forwards frames from the channel to the WebSocket.
    let writer_conn = conn;
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                tracing::warn!(conn = %writer_conn, "WebSocket write failed");
                break;
            }
        }
    });

    // Reader loop: frames from one connection are handled in arrival order.
    let reader_state = Arc::clone(&state);
    let reader_tx = tx.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_frame(&reader_state, conn, &reader_tx, text.as_str()).await;
                }
                Message::Close(_) => {
                    tracing::debug!(conn = %conn, "received close frame");
                    break;
                }
                _ => {
                    // Ignore binary, ping, and pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    handle_disconnect(&state, conn).await;
}

/// Routes one inbound text frame from one connection.
async fn handle_frame(
    state: &RelayState,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<Message>,
    text: &str,
) {
    let parsed = match frame::decode_client(text) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(conn = %conn, error = %e, "failed to decode frame");
            send_frame(tx, &ServerFrame::system(PARSE_ERROR_NOTICE));
            return;
        }
    };

    match parsed {
        ClientFrame::Join { room_id, username } => {
            handle_join(state, conn, tx, room_id, username).await;
        }
        ClientFrame::Chat { message } => {
            handle_chat(state, conn, tx, message).await;
        }
        ClientFrame::Unknown => {
            tracing::debug!(conn = %conn, "ignoring frame with unrecognized type");
        }
    }
}

/// Places a connection in a room, replacing any previous membership.
///
/// The joining connection gets a confirmation; every other member of the
/// room gets a join announcement. A previous room is left silently — no
/// leave notice goes to its remaining members.
async fn handle_join(
    state: &RelayState,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<Message>,
    room_id: Option<String>,
    username: Option<String>,
) {
    let (Some(room), Some(username)) = (non_empty(room_id), non_empty(username)) else {
        tracing::warn!(conn = %conn, "dropping join frame missing roomId or username");
        return;
    };

    state
        .registry
        .upsert(Participant {
            conn,
            room: room.clone(),
            username: username.clone(),
            sender: tx.clone(),
        })
        .await;

    tracing::info!(conn = %conn, room = %room, username = %username, "participant joined");

    send_frame(tx, &ServerFrame::system(format!("You joined room {room}")));

    let announcement = ServerFrame::system(format!("{username} has joined the room"));
    for member in state.registry.members_of(&room).await {
        if member.conn != conn {
            send_frame(&member.sender, &announcement);
        }
    }
}

/// Fans a chat message or typing indicator out to the sender's room.
async fn handle_chat(
    state: &RelayState,
    conn: ConnId,
    tx: &mpsc::UnboundedSender<Message>,
    message: Option<String>,
) {
    let Some(message) = non_empty(message) else {
        tracing::warn!(conn = %conn, "dropping chat frame missing message content");
        return;
    };

    let Some(sender) = state.registry.find(conn).await else {
        tracing::debug!(conn = %conn, "chat from unjoined connection rejected");
        send_frame(tx, &ServerFrame::system(JOIN_FIRST_NOTICE));
        return;
    };

    if message == frame::TYPING_SENTINEL {
        let indicator = ServerFrame::member(&sender.username, frame::TYPING_SENTINEL);
        for member in state.registry.members_of(&sender.room).await {
            if member.conn != conn {
                send_frame(&member.sender, &indicator);
            }
        }
        return;
    }

    let outbound = ServerFrame::member(&sender.username, message);
    let members = state.registry.members_of(&sender.room).await;
    tracing::debug!(
        conn = %conn,
        room = %sender.room,
        recipients = members.len(),
        "fanning out chat message"
    );
    // Sender included: clients render their own message from the echo.
    for member in &members {
        send_frame(&member.sender, &outbound);
    }
}

/// Tears down a connection's room membership after its socket closed.
///
/// No-op for connections that never joined.
async fn handle_disconnect(state: &RelayState, conn: ConnId) {
    let Some(participant) = state.registry.remove(conn).await else {
        tracing::debug!(conn = %conn, "connection closed without joining");
        return;
    };

    tracing::info!(
        conn = %conn,
        room = %participant.room,
        username = %participant.username,
        "participant disconnected"
    );

    let announcement = ServerFrame::system(format!("{} has left the room", participant.username));
    for member in state.registry.members_of(&participant.room).await {
        send_frame(&member.sender, &announcement);
    }
}

/// Encodes a frame and delivers it on a connection's outbound channel.
///
/// Each send is independently best-effort: a failed send means the
/// recipient's writer task is gone, and its registry entry is left for the
/// disconnect path to clean up.
fn send_frame(tx: &mpsc::UnboundedSender<Message>, payload: &ServerFrame) {
    if let Ok(json) = frame::encode_server(payload) {
        let _ = tx.send(Message::Text(json.into()));
    }
}

/// Treats a missing or empty string field as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Starts the relay server on the given address and returns the bound
/// address and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(RelayState::new())).await
}

/// Starts the relay server with a pre-built [`RelayState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<RelayState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/", axum::routing::get(health_handler))
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "relay server error");
        }
    });

    Ok((bound_addr, handle))
}

/// Liveness endpoint for load balancers and uptime monitors.
async fn health_handler() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ChatZone relay server is running" }))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<RelayState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
