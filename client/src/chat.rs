//! Chat screen state
//!
//! A [`ChatRoom`] lives exactly as long as the screen showing one
//! conversation. Mounting joins the room and loads history over REST;
//! unmounting leaves the room but keeps the session open for the rest of
//! the app.
//!
//! Sends are optimistic. Each one is tagged with a client-side correlation
//! id and shown as pending until the server answers. Success swaps the
//! pending entry for the persisted message; the server's own echo is
//! recognised by message id, whichever of the two arrives first. Failure
//! removes the entry and parks the payload for a retry.

use chrono::{DateTime, Utc};
use miramatch_shared::{ClientEvent, Message, MessagePayload, SenderType, ServerEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::ConversationApi;
use crate::error::Result;
use crate::session::{RealtimeLink, SessionEvent};
use crate::typing::{PeerTypingIndicator, TypingDebouncer};

/// One row of the visible timeline
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEntry {
    /// Shown locally, not yet acknowledged
    Pending {
        correlation_id: Uuid,
        payload: MessagePayload,
        queued_at: DateTime<Utc>,
    },
    /// Persisted by the server
    Confirmed {
        /// Set when this client sent it
        correlation_id: Option<Uuid>,
        message: Message,
    },
}

impl ChatEntry {
    pub fn correlation_id(&self) -> Option<Uuid> {
        match self {
            ChatEntry::Pending { correlation_id, .. } => Some(*correlation_id),
            ChatEntry::Confirmed { correlation_id, .. } => *correlation_id,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            ChatEntry::Pending { .. } => None,
            ChatEntry::Confirmed { message, .. } => Some(message),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ChatEntry::Pending { .. })
    }
}

/// Delivery state of a local send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed,
    Failed,
}

/// A send the server rejected, kept so the user can retry it
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSend {
    pub correlation_id: Uuid,
    pub payload: MessagePayload,
    pub error: String,
}

pub struct ChatRoom {
    conversation_id: String,
    me: SenderType,
    api: Arc<dyn ConversationApi>,
    link: Arc<dyn RealtimeLink>,
    events: broadcast::Receiver<SessionEvent>,
    entries: Vec<ChatEntry>,
    failed: Vec<FailedSend>,
    typing: TypingDebouncer,
    peer_typing: PeerTypingIndicator,
}

impl ChatRoom {
    /// Connect if needed, join the room and load the history
    pub async fn mount(
        conversation_id: impl Into<String>,
        me: SenderType,
        api: Arc<dyn ConversationApi>,
        link: Arc<dyn RealtimeLink>,
        typing_quiet_interval: Duration,
    ) -> Result<Self> {
        let conversation_id = conversation_id.into();
        link.ensure_connected().await?;

        // Subscribe before joining so nothing sent after the join is missed
        let events = link.subscribe();
        link.send_event(ClientEvent::JoinConversation {
            conversation_id: conversation_id.clone(),
        })
        .await?;

        let mut room = Self {
            conversation_id,
            me,
            api,
            link,
            events,
            entries: Vec::new(),
            failed: Vec::new(),
            typing: TypingDebouncer::new(typing_quiet_interval),
            peer_typing: PeerTypingIndicator::new(typing_quiet_interval),
        };
        room.refresh().await?;
        info!("Mounted chat for conversation {}", short(&room.conversation_id));
        Ok(room)
    }

    /// Leave the room. The session itself stays connected.
    pub async fn unmount(mut self) {
        self.stop_typing().await;
        self.signal(ClientEvent::LeaveConversation {
            conversation_id: self.conversation_id.clone(),
        })
        .await;
        debug!("Unmounted chat for conversation {}", short(&self.conversation_id));
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn failed_sends(&self) -> &[FailedSend] {
        &self.failed
    }

    pub fn is_peer_typing(&self) -> bool {
        self.peer_typing.is_typing()
    }

    pub fn delivery(&self, correlation_id: Uuid) -> Option<Delivery> {
        if self.failed.iter().any(|f| f.correlation_id == correlation_id) {
            return Some(Delivery::Failed);
        }
        self.entries
            .iter()
            .find(|e| e.correlation_id() == Some(correlation_id))
            .map(|e| {
                if e.is_pending() {
                    Delivery::Pending
                } else {
                    Delivery::Confirmed
                }
            })
    }

    /// Reload the history, keeping pending sends at the tail
    pub async fn refresh(&mut self) -> Result<()> {
        let history = self.api.list_messages(&self.conversation_id).await?;

        let mut entries: Vec<ChatEntry> = history
            .into_iter()
            .map(|message| {
                let correlation_id = self.correlation_for(&message.id);
                ChatEntry::Confirmed {
                    correlation_id,
                    message,
                }
            })
            .collect();
        entries.extend(self.entries.iter().filter(|e| e.is_pending()).cloned());
        self.entries = entries;
        Ok(())
    }

    pub async fn send_text(&mut self, text: &str) -> Result<Message> {
        self.send(MessagePayload::text(text)).await
    }

    /// Optimistically append, then persist over REST
    pub async fn send(&mut self, payload: MessagePayload) -> Result<Message> {
        let payload = payload.validate(usize::MAX)?;
        self.send_tagged(Uuid::new_v4(), payload).await
    }

    /// Send a failed payload again under its original correlation id
    pub async fn retry(&mut self, correlation_id: Uuid) -> Option<Result<Message>> {
        let index = self
            .failed
            .iter()
            .position(|f| f.correlation_id == correlation_id)?;
        let failed = self.failed.remove(index);
        Some(self.send_tagged(failed.correlation_id, failed.payload).await)
    }

    pub fn discard(&mut self, correlation_id: Uuid) {
        self.failed.retain(|f| f.correlation_id != correlation_id);
    }

    async fn send_tagged(&mut self, correlation_id: Uuid, payload: MessagePayload) -> Result<Message> {
        self.stop_typing().await;

        self.entries.push(ChatEntry::Pending {
            correlation_id,
            payload: payload.clone(),
            queued_at: Utc::now(),
        });

        match self.api.send_message(&self.conversation_id, &payload).await {
            Ok(message) => {
                self.confirm(correlation_id, message.clone());
                Ok(message)
            }
            Err(e) => {
                warn!("Send failed in {}: {}", short(&self.conversation_id), e);
                self.entries
                    .retain(|entry| entry.correlation_id() != Some(correlation_id) || !entry.is_pending());
                self.failed.push(FailedSend {
                    correlation_id,
                    payload,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Swap a pending entry for the persisted message
    fn confirm(&mut self, correlation_id: Uuid, message: Message) {
        self.entries
            .retain(|e| !(e.is_pending() && e.correlation_id() == Some(correlation_id)));

        // The echo may already be on screen
        let echoed = self
            .entries
            .iter()
            .position(|e| e.message().map(|m| m.id == message.id).unwrap_or(false));
        match echoed {
            Some(index) => {
                if let ChatEntry::Confirmed {
                    correlation_id: tag,
                    ..
                } = &mut self.entries[index]
                {
                    *tag = Some(correlation_id);
                }
            }
            None => self.insert_confirmed(Some(correlation_id), message),
        }
    }

    /// Place a persisted message by creation time, ahead of pending sends
    fn insert_confirmed(&mut self, correlation_id: Option<Uuid>, message: Message) {
        let at = message.created_at;
        let position = self
            .entries
            .iter()
            .position(|e| match e {
                ChatEntry::Pending { .. } => true,
                ChatEntry::Confirmed { message, .. } => message.created_at > at,
            })
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            ChatEntry::Confirmed {
                correlation_id,
                message,
            },
        );
    }

    fn contains_message(&self, message_id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.message().map(|m| m.id == message_id).unwrap_or(false))
    }

    fn correlation_for(&self, message_id: &str) -> Option<Uuid> {
        self.entries.iter().find_map(|e| match e {
            ChatEntry::Confirmed {
                correlation_id,
                message,
            } if message.id == message_id => *correlation_id,
            _ => None,
        })
    }

    /// Text input changed
    pub async fn on_input(&mut self, text: &str) {
        if text.is_empty() {
            self.stop_typing().await;
        } else if self.typing.keystroke() {
            self.signal(ClientEvent::TypingStart {
                conversation_id: self.conversation_id.clone(),
            })
            .await;
        }
    }

    async fn stop_typing(&mut self) {
        if self.typing.stop() {
            self.signal(ClientEvent::TypingStop {
                conversation_id: self.conversation_id.clone(),
            })
            .await;
        }
    }

    /// Fire whatever typing timers fell due
    pub async fn tick(&mut self) {
        if self.typing.poll_expired() {
            self.signal(ClientEvent::TypingStop {
                conversation_id: self.conversation_id.clone(),
            })
            .await;
        }
        self.peer_typing.prune();
    }

    /// Mark every unread message from the other side as read
    pub async fn mark_seen(&mut self) -> Result<usize> {
        let unread: Vec<String> = self
            .entries
            .iter()
            .filter_map(ChatEntry::message)
            .filter(|m| m.sender_type != self.me && !m.is_read)
            .map(|m| m.id.clone())
            .collect();

        for id in &unread {
            self.api.mark_message_read(id).await?;
            self.set_read(id);
        }
        Ok(unread.len())
    }

    fn set_read(&mut self, message_id: &str) {
        for entry in &mut self.entries {
            if let ChatEntry::Confirmed { message, .. } = entry {
                if message.id == message_id {
                    message.is_read = true;
                }
            }
        }
    }

    /// Wait for the next session event or typing deadline and apply it.
    /// Returns false once the session is gone.
    pub async fn next_update(&mut self) -> Result<bool> {
        let deadline = match (self.typing.deadline(), self.peer_typing.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        tokio::select! {
            received = self.events.recv() => match received {
                Ok(event) => {
                    self.handle(event).await?;
                    Ok(true)
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Chat missed {} realtime events, reloading history", skipped);
                    self.refresh().await?;
                    Ok(true)
                }
                Err(RecvError::Closed) => Ok(false),
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                self.tick().await;
                Ok(true)
            }
        }
    }

    /// Apply one session event to the screen state
    pub async fn handle(&mut self, event: SessionEvent) -> Result<()> {
        match event {
            SessionEvent::Server(event) => {
                if event.conversation_id() == Some(self.conversation_id.as_str()) {
                    self.apply_server_event(event);
                } else if let ServerEvent::Error { code, message } = event {
                    warn!("Server error {}: {}", code, message);
                }
            }
            SessionEvent::Reconnected => {
                info!("Rejoining conversation {} after reconnect", short(&self.conversation_id));
                self.peer_typing.clear();
                self.link
                    .send_event(ClientEvent::JoinConversation {
                        conversation_id: self.conversation_id.clone(),
                    })
                    .await?;
                // Messages persisted while offline only exist in the history
                self.refresh().await?;
            }
            SessionEvent::Disconnected => {
                self.peer_typing.clear();
                self.typing.stop();
            }
        }
        Ok(())
    }

    fn apply_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::NewMessage { message } => {
                if message.sender_type != self.me {
                    self.peer_typing.stopped(&message.sender_id);
                }
                if !self.contains_message(&message.id) {
                    self.insert_confirmed(None, message);
                }
            }
            ServerEvent::UserTyping { user_id, .. } => self.peer_typing.started(&user_id),
            ServerEvent::UserTypingStopped { user_id, .. } => self.peer_typing.stopped(&user_id),
            ServerEvent::MessageRead { message_id, .. } => self.set_read(&message_id),
            ServerEvent::Joined { .. } | ServerEvent::Left { .. } => {}
            ServerEvent::Error { .. } | ServerEvent::Pong => {}
        }
    }

    /// Typing and leave signals are hints; a dropped one is harmless
    async fn signal(&self, event: ClientEvent) {
        if let Err(e) = self.link.send_event(event).await {
            debug!("Realtime signal not sent: {}", e);
        }
    }
}

fn short(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
