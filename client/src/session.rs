//! Realtime session over the websocket transport
//!
//! One session per signed-in account, owned by the application context and
//! handed to screens. It keeps a single socket open, reconnects a bounded
//! number of times when it drops, and republishes server events to every
//! subscriber. Room membership is not restored after a reconnect: the
//! server starts the new connection in no rooms, so subscribers are told
//! with [`SessionEvent::Reconnected`] and rejoin what they still show.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use miramatch_shared::{decode_frame, encode_frame, ClientEvent, ServerEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outgoing frames buffered per connection
const OUTBOUND_BUFFER: usize = 100;

/// Events fanned out to session subscribers
const EVENT_BUFFER: usize = 256;

/// What subscribers of a session observe
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A frame from the server
    Server(ServerEvent),
    /// The socket came back after a drop; no rooms are joined
    Reconnected,
    /// The socket dropped and every reconnect attempt failed
    Disconnected,
}

/// The part of a realtime session a chat screen relies on
#[async_trait]
pub trait RealtimeLink: Send + Sync {
    /// Open the transport unless it is already open
    async fn ensure_connected(&self) -> Result<()>;

    /// Send one event; fails with `NotConnected` when the socket is down
    async fn send_event(&self, event: ClientEvent) -> Result<()>;

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Write half of an open connection
struct Connection {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Connection {
    async fn send(&self, data: Vec<u8>) -> Result<()> {
        self.tx.send(data).await.map_err(|_| ClientError::NotConnected)
    }
}

struct SessionInner {
    config: ClientConfig,
    token: String,
    connection: RwLock<Option<Connection>>,
    events: broadcast::Sender<SessionEvent>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
}

/// Handle to the account's realtime session; clones share the socket
#[derive(Clone)]
pub struct RealtimeSession {
    inner: Arc<SessionInner>,
}

/// Why a connection's pump loop returned
enum PumpEnd {
    /// The session dropped its sender on purpose
    Closed,
    /// The socket failed or the server closed it
    Lost,
}

impl RealtimeSession {
    pub fn new(config: ClientConfig, token: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: Arc::new(SessionInner {
                config,
                token: token.into(),
                connection: RwLock::new(None),
                events,
                supervisor: Mutex::new(None),
                closing: AtomicBool::new(false),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.read().await.is_some()
    }

    /// Open the socket, or do nothing if it is open
    pub async fn connect(&self) -> Result<()> {
        let mut supervisor = self.inner.supervisor.lock().await;
        if self.is_connected().await {
            return Ok(());
        }
        // A previous supervisor may still be retrying
        if let Some(handle) = supervisor.take() {
            handle.abort();
        }

        self.inner.closing.store(false, Ordering::SeqCst);
        let socket = open_socket(&self.inner.config, &self.inner.token).await?;
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        *self.inner.connection.write().await = Some(Connection { tx });

        *supervisor = Some(tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            socket,
            rx,
        )));
        info!("Realtime session connected to {}", self.inner.config.socket_url);
        Ok(())
    }

    /// Close the socket without reconnecting
    pub async fn disconnect(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        // Dropping the sender lets the pump send a close frame and exit
        let had_connection = self.inner.connection.write().await.take().is_some();

        if let Some(mut handle) = self.inner.supervisor.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(1), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
        if had_connection {
            info!("Realtime session disconnected");
        }
    }

    pub async fn join(&self, conversation_id: &str) -> Result<()> {
        self.send(ClientEvent::JoinConversation {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    pub async fn leave(&self, conversation_id: &str) -> Result<()> {
        self.send(ClientEvent::LeaveConversation {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    pub async fn typing_start(&self, conversation_id: &str) -> Result<()> {
        self.send(ClientEvent::TypingStart {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    pub async fn typing_stop(&self, conversation_id: &str) -> Result<()> {
        self.send(ClientEvent::TypingStop {
            conversation_id: conversation_id.to_string(),
        })
        .await
    }

    pub async fn mark_read(&self, message_id: &str) -> Result<()> {
        self.send(ClientEvent::MessageRead {
            message_id: message_id.to_string(),
        })
        .await
    }

    pub async fn send(&self, event: ClientEvent) -> Result<()> {
        let frame = encode_frame(&event)?;
        let guard = self.inner.connection.read().await;
        let connection = guard.as_ref().ok_or(ClientError::NotConnected)?;
        connection.send(frame).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }
}

#[async_trait]
impl RealtimeLink for RealtimeSession {
    async fn ensure_connected(&self) -> Result<()> {
        self.connect().await
    }

    async fn send_event(&self, event: ClientEvent) -> Result<()> {
        self.send(event).await
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        RealtimeSession::subscribe(self)
    }
}

async fn open_socket(config: &ClientConfig, token: &str) -> Result<Socket> {
    let mut request = config
        .socket_url
        .as_str()
        .into_client_request()
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| ClientError::Transport(e.to_string()))?;
    request.headers_mut().insert("Authorization", bearer);

    match connect_async(request).await {
        Ok((socket, _)) => Ok(socket),
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => Err(ClientError::Api {
            status: response.status().as_u16(),
            message: "Handshake rejected".to_string(),
        }),
        Err(e) => Err(ClientError::Transport(e.to_string())),
    }
}

/// Serve the current socket, and reconnect while the session is alive
async fn supervise(session: Weak<SessionInner>, mut socket: Socket, mut rx: mpsc::Receiver<Vec<u8>>) {
    loop {
        let events = match session.upgrade() {
            Some(inner) => inner.events.clone(),
            None => return,
        };
        if let PumpEnd::Closed = pump(socket, &mut rx, &events).await {
            return;
        }

        let Some(inner) = session.upgrade() else {
            return;
        };
        inner.connection.write().await.take();
        warn!("Realtime connection lost");

        match reconnect(&inner).await {
            Some(next) => {
                let (tx, next_rx) = mpsc::channel(OUTBOUND_BUFFER);
                *inner.connection.write().await = Some(Connection { tx });
                socket = next;
                rx = next_rx;
                let _ = inner.events.send(SessionEvent::Reconnected);
            }
            None => {
                let _ = inner.events.send(SessionEvent::Disconnected);
                return;
            }
        }
    }
}

async fn reconnect(inner: &SessionInner) -> Option<Socket> {
    let attempts = inner.config.reconnect_attempts;
    for attempt in 1..=attempts {
        tokio::time::sleep(inner.config.reconnect_delay).await;
        if inner.closing.load(Ordering::SeqCst) {
            return None;
        }
        match open_socket(&inner.config, &inner.token).await {
            Ok(socket) => {
                info!("Reconnected on attempt {}/{}", attempt, attempts);
                return Some(socket);
            }
            Err(e) => warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e),
        }
    }
    warn!("Giving up after {} reconnect attempts", attempts);
    None
}

/// Move frames both ways until either side ends
async fn pump(
    socket: Socket,
    outbound: &mut mpsc::Receiver<Vec<u8>>,
    events: &broadcast::Sender<SessionEvent>,
) -> PumpEnd {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(data) => {
                    if let Err(e) = write.send(WsMessage::Binary(data)).await {
                        warn!("WebSocket send error: {}", e);
                        return PumpEnd::Lost;
                    }
                }
                None => {
                    let _ = write.close().await;
                    return PumpEnd::Closed;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Binary(data))) => match decode_frame::<ServerEvent>(&data) {
                    Ok(event) => {
                        // No subscribers is fine
                        let _ = events.send(SessionEvent::Server(event));
                    }
                    Err(e) => warn!("Dropping undecodable frame: {}", e),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    info!("Server closed connection");
                    return PumpEnd::Lost;
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return PumpEnd::Lost;
                }
                Some(Ok(other)) => debug!("Ignoring non-binary frame: {:?}", other),
            },
        }
    }
}
