//! MiraMatch conversation client
//!
//! The pieces a chat front end needs on top of the MiraMatch server:
//! a REST client for the durable history, a realtime session over the
//! websocket transport, a per-screen chat room with optimistic sends, and
//! the typing debounce on both ends of the wire.

pub mod api;
pub mod app;
pub mod chat;
pub mod config;
pub mod error;
pub mod session;
pub mod typing;

pub use api::{ConversationApi, HttpApi, Inbox, ProjectConversation};
pub use app::AppContext;
pub use chat::{ChatEntry, ChatRoom, Delivery, FailedSend};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::{RealtimeLink, RealtimeSession, SessionEvent};
pub use typing::{PeerTypingIndicator, TypingDebouncer};
