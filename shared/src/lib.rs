//! MiraMatch wire vocabulary
//!
//! Types exchanged between the MiraMatch server and its clients: the
//! persisted conversation/message/notification shapes served over REST,
//! and the realtime events carried over the websocket transport.

#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod types;

pub use error::ProtocolError;
pub use events::{decode_frame, encode_frame, ClientEvent, ServerEvent};
pub use types::{
    Conversation, ConversationSummary, Message, MessagePayload, MessageType, NotificationType,
    ParticipantProfile, Role, SellerNotification, SenderType, UserNotification,
};

/// Version of the realtime protocol
pub const PROTOCOL_VERSION: u8 = 1;
