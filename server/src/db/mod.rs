//! Storage abstraction layer
//!
//! Defines the `MessageStore` trait covering every persistence operation of
//! the messaging core. The services hold an `Arc<dyn MessageStore>`; the
//! server runs on SQLite.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use miramatch_shared::{
    Conversation, Message, MessagePayload, NotificationType, ParticipantProfile,
    SellerNotification, SenderType, UserNotification,
};

pub use crate::database::{NewQuote, ProjectRecord, QuoteRecord, SellerRecord};
pub use sqlite::SqliteStore;

#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    // ── Identity & projects ──────────────────────────────────────────────
    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectRecord>>;
    async fn get_seller(&self, seller_id: &str) -> Result<Option<SellerRecord>>;
    async fn get_seller_by_user(&self, user_id: &str) -> Result<Option<SellerRecord>>;
    async fn get_user_profile(&self, user_id: &str) -> Result<Option<ParticipantProfile>>;
    async fn get_seller_profile(&self, seller_id: &str) -> Result<Option<ParticipantProfile>>;

    // ── Conversations ────────────────────────────────────────────────────
    async fn find_conversation(
        &self, client_id: &str, creator_id: &str, project_id: &str, subject_hint: &str,
    ) -> Result<Option<Conversation>>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>>;

    async fn list_conversations(
        &self, side: SenderType, participant_id: &str,
    ) -> Result<Vec<Conversation>>;

    /// Conversation and opening message in one unit; `None` when an
    /// equivalent conversation already exists
    async fn create_seeded_conversation(
        &self, client_id: &str, creator_id: &str, project_id: Option<&str>, subject: &str,
        greeting_sender: (&str, SenderType), greeting: &MessagePayload,
    ) -> Result<Option<(Conversation, Message)>>;

    // ── Messages ─────────────────────────────────────────────────────────
    /// `None` when the conversation does not exist
    async fn append_message(
        &self, conversation_id: &str, sender_id: &str, sender_type: SenderType,
        payload: &MessagePayload,
    ) -> Result<Option<Message>>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;
    async fn get_message(&self, message_id: &str) -> Result<Option<Message>>;
    async fn last_message(&self, conversation_id: &str) -> Result<Option<Message>>;
    /// True only when the flag actually flipped
    async fn mark_message_read(&self, message_id: &str) -> Result<bool>;
    async fn count_unread(&self, conversation_id: &str, excluding: SenderType) -> Result<i64>;

    // ── Notifications ────────────────────────────────────────────────────
    async fn insert_user_notification(
        &self, user_id: &str, kind: NotificationType, title: &str, message: &str,
        data: &serde_json::Value,
    ) -> Result<UserNotification>;

    async fn get_unread_notifications(&self, user_id: &str) -> Result<Vec<UserNotification>>;
    async fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> Result<bool>;
    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64>;

    async fn insert_seller_notification(
        &self, seller_id: &str, kind: NotificationType, title: &str, message: &str,
        data: &serde_json::Value,
    ) -> Result<SellerNotification>;

    async fn get_unread_seller_notifications(
        &self, seller_id: &str,
    ) -> Result<Vec<SellerNotification>>;

    // ── Quote offers ─────────────────────────────────────────────────────
    async fn insert_quote_offer(&self, quote: &NewQuote<'_>) -> Result<QuoteRecord>;
    async fn get_quote_offer(&self, quote_id: &str) -> Result<Option<QuoteRecord>>;
    async fn update_quote_offer(
        &self, quote_id: &str, price: Option<f64>, delivery_days: Option<i64>,
        description: Option<&str>,
    ) -> Result<Option<QuoteRecord>>;
    async fn set_quote_status(&self, quote_id: &str, status: &str) -> Result<()>;
}
