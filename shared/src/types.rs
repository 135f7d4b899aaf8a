//! Persisted shapes served by the REST surface and carried in realtime events
//!
//! Field names serialize in camelCase and timestamps as ISO-8601 strings so
//! the same JSON is produced by REST responses and by `new_message` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Which side of a conversation wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    /// The seller answering a project
    Creator,
    /// The project owner
    Client,
}

impl SenderType {
    /// Stable string form, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Creator => "creator",
            SenderType::Client => "client",
        }
    }
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SenderType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "creator" => Ok(SenderType::Creator),
            "client" => Ok(SenderType::Client),
            other => Err(ProtocolError::UnknownVariant {
                field: "senderType",
                value: other.to_string(),
            }),
        }
    }
}

/// Authenticated role of a user
///
/// Credentials carry upper-case role names; `SELLER` is accepted as an alias
/// of `CREATOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Project owner
    Client,
    /// Seller submitting quotes
    Creator,
}

impl Role {
    /// Sender type a user with this role writes messages as
    pub fn sender_type(&self) -> SenderType {
        match self {
            Role::Client => SenderType::Client,
            Role::Creator => SenderType::Creator,
        }
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CLIENT" => Ok(Role::Client),
            "CREATOR" | "SELLER" => Ok(Role::Creator),
            other => Err(ProtocolError::UnknownVariant {
                field: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of message body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Plain text in `content`
    #[default]
    Text,
    /// A recorded clip referenced by `audioUrl`
    Audio,
}

impl MessageType {
    /// Stable string form, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Audio => "audio",
        }
    }
}

impl FromStr for MessageType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(MessageType::Text),
            "audio" => Ok(MessageType::Audio),
            other => Err(ProtocolError::UnknownVariant {
                field: "type",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Server-assigned id
    pub id: String,
    /// Owning conversation
    pub conversation_id: String,
    /// Seller id for creators, user id for clients
    pub sender_id: String,
    /// Role of the sender at send time
    pub sender_type: SenderType,
    /// Text body (absent for audio)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Location of the audio clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Clip length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<u32>,
    /// Body kind
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Whether the recipient side has read it
    pub is_read: bool,
    /// Persistence time, the ordering key within a conversation
    pub created_at: DateTime<Utc>,
}

/// Body of a message being sent, before the server assigns identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Body kind, text when omitted
    #[serde(rename = "type", default)]
    pub kind: MessageType,
    /// Text body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Location of an uploaded audio clip
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    /// Clip length in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<u32>,
}

impl MessagePayload {
    /// Text message payload
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageType::Text,
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Audio message payload
    pub fn audio(audio_url: impl Into<String>, duration_secs: u32) -> Self {
        Self {
            kind: MessageType::Audio,
            audio_url: Some(audio_url.into()),
            audio_duration: Some(duration_secs),
            ..Default::default()
        }
    }

    /// Check the text/audio invariant and return the normalized payload.
    ///
    /// Text keeps only `content`; audio keeps only `audioUrl` and
    /// `audioDuration`. `max_content_len` bounds text size in bytes.
    pub fn validate(self, max_content_len: usize) -> Result<Self> {
        match self.kind {
            MessageType::Text => {
                let content = self.content.unwrap_or_default();
                if content.trim().is_empty() {
                    return Err(ProtocolError::InvalidPayload(
                        "text message requires content".into(),
                    ));
                }
                if content.len() > max_content_len {
                    return Err(ProtocolError::InvalidPayload(format!(
                        "content exceeds {} bytes",
                        max_content_len
                    )));
                }
                Ok(Self {
                    kind: MessageType::Text,
                    content: Some(content),
                    audio_url: None,
                    audio_duration: None,
                })
            }
            MessageType::Audio => {
                let audio_url = self.audio_url.unwrap_or_default();
                if audio_url.trim().is_empty() {
                    return Err(ProtocolError::InvalidPayload(
                        "audio message requires audioUrl".into(),
                    ));
                }
                Ok(Self {
                    kind: MessageType::Audio,
                    content: None,
                    audio_url: Some(audio_url),
                    audio_duration: Some(self.audio_duration.unwrap_or(0)),
                })
            }
        }
    }
}

/// A conversation between one client and one creator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id, also the realtime room id
    pub id: String,
    /// Project owner
    pub client_id: String,
    /// Seller id
    pub creator_id: String,
    /// Originating project, absent for conversations predating project keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Display label copied from the project name
    pub subject: String,
    /// Time of the newest message
    pub last_message_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Which side `participant_id` is on, if it participates at all
    pub fn side_of(&self, participant_id: &str) -> Option<SenderType> {
        if self.creator_id == participant_id {
            Some(SenderType::Creator)
        } else if self.client_id == participant_id {
            Some(SenderType::Client)
        } else {
            None
        }
    }
}

/// Display data for the other participant of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfile {
    /// User id (for creators, the user behind the seller)
    pub id: String,
    /// Display name
    pub name: String,
    /// Avatar location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

/// A conversation as listed for one viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// The conversation itself
    #[serde(flatten)]
    pub conversation: Conversation,
    /// The other participant
    pub counterpart: ParticipantProfile,
    /// Newest message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    /// Unread messages written by the other side
    pub unread_count: i64,
}

/// Enumerated reason for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A creator submitted a quote on the client's project
    NewQuoteOffer,
    /// The client accepted a creator's quote
    QuoteAccepted,
    /// The client rejected a creator's quote
    QuoteRejected,
    /// A creator changed a submitted quote
    QuoteUpdated,
    /// A message arrived while the recipient was not in the room
    NewMessage,
}

impl NotificationType {
    /// Stable string form, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::NewQuoteOffer => "new_quote_offer",
            NotificationType::QuoteAccepted => "quote_accepted",
            NotificationType::QuoteRejected => "quote_rejected",
            NotificationType::QuoteUpdated => "quote_updated",
            NotificationType::NewMessage => "new_message",
        }
    }
}

impl FromStr for NotificationType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new_quote_offer" => Ok(NotificationType::NewQuoteOffer),
            "quote_accepted" => Ok(NotificationType::QuoteAccepted),
            "quote_rejected" => Ok(NotificationType::QuoteRejected),
            "quote_updated" => Ok(NotificationType::QuoteUpdated),
            "new_message" => Ok(NotificationType::NewMessage),
            other => Err(ProtocolError::UnknownVariant {
                field: "notification type",
                value: other.to_string(),
            }),
        }
    }
}

/// In-app notification addressed to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserNotification {
    /// Notification id
    pub id: String,
    /// Recipient user id
    pub user_id: String,
    /// Reason
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Correlation ids for deep links
    pub data: serde_json::Value,
    /// Read flag, only ever goes false to true
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// In-app notification addressed to a seller
///
/// Sellers live in their own identity space, so their notifications are a
/// separate record from [`UserNotification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerNotification {
    /// Notification id
    pub id: String,
    /// Recipient seller id
    pub seller_id: String,
    /// Reason
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Correlation ids for deep links
    pub data: serde_json::Value,
    /// Read flag
    pub is_read: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_drops_audio_fields() {
        let payload = MessagePayload {
            kind: MessageType::Text,
            content: Some("Bonjour".into()),
            audio_url: Some("https://cdn/x.m4a".into()),
            audio_duration: Some(4),
        };
        let normalized = payload.validate(1024).unwrap();
        assert_eq!(normalized.content.as_deref(), Some("Bonjour"));
        assert!(normalized.audio_url.is_none());
        assert!(normalized.audio_duration.is_none());
    }

    #[test]
    fn test_empty_text_rejected() {
        let err = MessagePayload::text("   ").validate(1024).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    }

    #[test]
    fn test_oversized_text_rejected() {
        let err = MessagePayload::text("x".repeat(11)).validate(10).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPayload(_)));
    }

    #[test]
    fn test_audio_requires_url() {
        let payload = MessagePayload {
            kind: MessageType::Audio,
            ..Default::default()
        };
        assert!(payload.validate(1024).is_err());

        let ok = MessagePayload::audio("https://cdn/clip.m4a", 12).validate(1024).unwrap();
        assert!(ok.content.is_none());
        assert_eq!(ok.audio_duration, Some(12));
    }

    #[test]
    fn test_role_aliases() {
        assert_eq!("SELLER".parse::<Role>().unwrap(), Role::Creator);
        assert_eq!("client".parse::<Role>().unwrap(), Role::Client);
        assert!("ADMIN".parse::<Role>().is_err());
        assert_eq!(Role::Creator.sender_type(), SenderType::Creator);
    }

    #[test]
    fn test_message_json_shape() {
        let msg = Message {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "s1".into(),
            sender_type: SenderType::Creator,
            content: Some("Bonjour".into()),
            audio_url: None,
            audio_duration: None,
            kind: MessageType::Text,
            is_read: false,
            created_at: DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["conversationId"], "c1");
        assert_eq!(json["senderType"], "creator");
        assert_eq!(json["type"], "text");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["createdAt"], "2024-05-01T10:00:00Z");
        assert!(json.get("audioUrl").is_none());
    }
}
