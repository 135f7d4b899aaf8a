//! WebSocket handler for realtime conversation events

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        ConnectInfo, Query, State, WebSocketUpgrade,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use miramatch_shared::{decode_frame, encode_frame, ClientEvent, ServerEvent};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::{bearer_token, Identity};
use crate::error::{AppError, AppResult};
use crate::rooms::{short, ConnectionId, RoomMember};
use crate::state::ServerState;

/// Outbound frames buffered per connection before new ones are dropped
const OUTBOUND_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Rate limiter
// ---------------------------------------------------------------------------

/// Simple token-bucket rate limiter (not shared across threads)
struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: tokio::time::Instant,
}

impl RateLimiter {
    fn new(max_tokens: f64, refill_rate: f64) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: tokio::time::Instant::now(),
        }
    }

    /// Try to consume one token. Returns false if rate limit exceeded.
    fn try_consume(&mut self) -> bool {
        let now = tokio::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection state
// ---------------------------------------------------------------------------

struct Connection {
    id: ConnectionId,
    identity: Identity,
    tx: mpsc::Sender<Vec<u8>>,
    /// Rooms this connection joined; never restored across reconnects
    joined: HashSet<String>,
    /// 30 burst, 10/s refill
    rate_limiter: RateLimiter,
}

impl Connection {
    async fn send(&self, event: &ServerEvent) -> AppResult<()> {
        let frame = encode_frame(event)?;
        self.tx
            .send(frame)
            .await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("connection closed")))
    }
}

// ---------------------------------------------------------------------------
// WebSocket upgrade handler
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Authenticate, enforce connection limits, then upgrade
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let token = bearer_token(&headers).map(str::to_string).or(params.token);
    let Some(token) = token else {
        warn!("Handshake from {} rejected: no credential", addr);
        return AppError::Unauthorized.into_response();
    };

    let identity = match state.identify(&token).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Handshake from {} rejected: {}", addr, e);
            return e.into_response();
        }
    };

    let ip = addr.ip();
    if !state.try_acquire_connection(ip) {
        warn!("Connection rejected for {}: limit exceeded", ip);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let max_frame = state.config.max_message_size + 4096;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, state, addr, identity))
        .into_response()
}

// ---------------------------------------------------------------------------
// Socket lifecycle
// ---------------------------------------------------------------------------

async fn handle_socket(
    socket: WebSocket,
    state: Arc<ServerState>,
    addr: SocketAddr,
    identity: Identity,
) {
    let ip = addr.ip();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(OUTBOUND_BUFFER);

    let mut conn = Connection {
        id: state.next_connection_id(),
        identity,
        tx,
        joined: HashSet::new(),
        rate_limiter: RateLimiter::new(30.0, 10.0),
    };
    state
        .connections
        .insert(conn.id, conn.identity.participant_id.clone());

    info!(
        "Connection {} opened for {} {} ({})",
        conn.id,
        conn.identity.sender_type(),
        short(&conn.identity.participant_id),
        addr
    );

    // Forward outbound frames and send periodic pings
    let ping_interval_secs = state.config.ws_ping_interval.max(1);
    let forward_task = tokio::spawn(async move {
        let mut ping_ticker =
            tokio::time::interval(std::time::Duration::from_secs(ping_interval_secs));
        ping_ticker.tick().await; // skip first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(data) => {
                            if ws_sender.send(WsMessage::Binary(data)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_ticker.tick() => {
                    if ws_sender.send(WsMessage::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(next) = ws_receiver.next().await {
        match next {
            Ok(WsMessage::Binary(data)) => {
                if let Err(e) = handle_binary_message(&data, &mut conn, &state).await {
                    e.log();
                    let reply = ServerEvent::Error {
                        code: e.status_code().as_u16(),
                        message: e.user_message(),
                    };
                    if conn.send(&reply).await.is_err() {
                        break;
                    }
                }
            }
            Ok(WsMessage::Text(_)) => { /* ignore text frames */ }
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => { /* axum auto-responds to pings */ }
            Err(e) => {
                debug!("WebSocket error from {}: {}", addr, e);
                break;
            }
        }
    }

    // Cleanup: rooms are not kept for a later reconnect
    state.rooms.leave_all(&conn.joined, conn.id);
    state.connections.remove(&conn.id);
    state.release_connection(ip);
    forward_task.abort();

    info!(
        "Connection {} closed for {} ({} rooms left)",
        conn.id,
        short(&conn.identity.participant_id),
        conn.joined.len()
    );
}

// ---------------------------------------------------------------------------
// Protocol handler
// ---------------------------------------------------------------------------

async fn handle_binary_message(
    data: &[u8],
    conn: &mut Connection,
    state: &Arc<ServerState>,
) -> AppResult<()> {
    let event: ClientEvent = decode_frame(data)?;

    // Rate limit everything except keepalive
    if !matches!(event, ClientEvent::Ping) && !conn.rate_limiter.try_consume() {
        return Err(AppError::RateLimited);
    }

    match event {
        ClientEvent::JoinConversation { conversation_id } => {
            handle_join(&conversation_id, conn, state).await
        }
        ClientEvent::LeaveConversation { conversation_id } => {
            handle_leave(&conversation_id, conn, state).await
        }
        ClientEvent::SendMessage {
            conversation_id,
            message,
        } => {
            state
                .messaging
                .send_message(&conn.identity, &conversation_id, message)
                .await?;
            Ok(())
        }
        ClientEvent::TypingStart { conversation_id } => {
            handle_typing(&conversation_id, true, conn, state);
            Ok(())
        }
        ClientEvent::TypingStop { conversation_id } => {
            handle_typing(&conversation_id, false, conn, state);
            Ok(())
        }
        ClientEvent::MessageRead { message_id } => {
            state
                .messaging
                .mark_read(&conn.identity, &message_id, Some(conn.id))
                .await?;
            Ok(())
        }
        ClientEvent::Ping => conn.send(&ServerEvent::Pong).await,
    }
}

async fn handle_join(
    conversation_id: &str,
    conn: &mut Connection,
    state: &Arc<ServerState>,
) -> AppResult<()> {
    if !conn.joined.contains(conversation_id) {
        let conversation = state
            .messaging
            .conversation_for(&conn.identity, conversation_id)
            .await?;

        state.rooms.join(
            &conversation.id,
            conn.id,
            RoomMember {
                participant_id: conn.identity.participant_id.clone(),
                sender_type: conn.identity.sender_type(),
                tx: conn.tx.clone(),
            },
        );
        conn.joined.insert(conversation.id);
        debug!("Connection {} joined {}", conn.id, short(conversation_id));
    }

    conn.send(&ServerEvent::Joined {
        conversation_id: conversation_id.to_string(),
    })
    .await
}

async fn handle_leave(
    conversation_id: &str,
    conn: &mut Connection,
    state: &Arc<ServerState>,
) -> AppResult<()> {
    if conn.joined.remove(conversation_id) {
        state.rooms.leave(conversation_id, conn.id);
        debug!("Connection {} left {}", conn.id, short(conversation_id));
    }

    conn.send(&ServerEvent::Left {
        conversation_id: conversation_id.to_string(),
    })
    .await
}

/// Relay typing to the other members. Ignored unless the room was joined.
fn handle_typing(conversation_id: &str, started: bool, conn: &Connection, state: &Arc<ServerState>) {
    if !conn.joined.contains(conversation_id) {
        debug!(
            "Connection {} typing in unjoined room {}, ignored",
            conn.id,
            short(conversation_id)
        );
        return;
    }

    let room = conversation_id.to_string();
    let user_id = conn.identity.participant_id.clone();
    let event = if started {
        ServerEvent::UserTyping {
            conversation_id: room.clone(),
            user_id,
        }
    } else {
        ServerEvent::UserTypingStopped {
            conversation_id: room.clone(),
            user_id,
        }
    };
    state.rooms.broadcast(&room, &event, Some(conn.id));
}
