//! Realtime events exchanged over the websocket transport
//!
//! Frames are MessagePack maps with named fields and a `type` tag. Events
//! are fire-and-forget: nothing here is acknowledged or retried.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::types::{Message, MessagePayload};

/// Events a client sends to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Subscribe this connection to a conversation room
    JoinConversation {
        /// Room to join
        conversation_id: String,
    },
    /// Unsubscribe this connection from a conversation room
    LeaveConversation {
        /// Room to leave
        conversation_id: String,
    },
    /// Persist a message and fan it out to the room
    SendMessage {
        /// Target conversation
        conversation_id: String,
        /// Message body
        message: MessagePayload,
    },
    /// The user started typing
    TypingStart {
        /// Conversation being typed in
        conversation_id: String,
    },
    /// The user stopped typing
    TypingStop {
        /// Conversation being typed in
        conversation_id: String,
    },
    /// The user has seen a message
    MessageRead {
        /// Message that was read
        message_id: String,
    },
    /// Keepalive check
    Ping,
}

/// Events the server sends to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A message was persisted in a room this connection joined
    NewMessage {
        /// The persisted message
        message: Message,
    },
    /// Another member started typing
    UserTyping {
        /// Room
        conversation_id: String,
        /// Who is typing
        user_id: String,
    },
    /// Another member stopped typing
    UserTypingStopped {
        /// Room
        conversation_id: String,
        /// Who stopped
        user_id: String,
    },
    /// A message written by this side was read by the other side
    MessageRead {
        /// Message that was read
        message_id: String,
        /// Room
        conversation_id: String,
        /// Participant id of the reader
        read_by: String,
    },
    /// Room join confirmed
    Joined {
        /// Room
        conversation_id: String,
    },
    /// Room leave confirmed
    Left {
        /// Room
        conversation_id: String,
    },
    /// A request on this connection failed
    Error {
        /// HTTP-like status code
        code: u16,
        /// Generic description
        message: String,
    },
    /// Keepalive answer
    Pong,
}

impl ServerEvent {
    /// Conversation the event is scoped to, if any
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ServerEvent::NewMessage { message } => Some(&message.conversation_id),
            ServerEvent::UserTyping { conversation_id, .. }
            | ServerEvent::UserTypingStopped { conversation_id, .. }
            | ServerEvent::MessageRead { conversation_id, .. }
            | ServerEvent::Joined { conversation_id }
            | ServerEvent::Left { conversation_id } => Some(conversation_id),
            ServerEvent::Error { .. } | ServerEvent::Pong => None,
        }
    }
}

/// Serialize an event into a binary frame
pub fn encode_frame<T: Serialize>(event: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(event).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parse a binary frame into an event
pub fn decode_frame<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    rmp_serde::from_slice(data).map_err(|e| ProtocolError::Decode(e.to_string()))
}
