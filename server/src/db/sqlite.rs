//! SQLite implementation of MessageStore
//!
//! Thin wrapper over the `database` functions.

use super::{MessageStore, NewQuote, ProjectRecord, QuoteRecord, SellerRecord};
use crate::database;
use anyhow::Result;
use async_trait::async_trait;
use miramatch_shared::{
    Conversation, Message, MessagePayload, NotificationType, ParticipantProfile,
    SellerNotification, SenderType, UserNotification,
};
use sqlx::{Pool, Sqlite};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn get_project(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        database::get_project(&self.pool, project_id).await
    }

    async fn get_seller(&self, seller_id: &str) -> Result<Option<SellerRecord>> {
        database::get_seller(&self.pool, seller_id).await
    }

    async fn get_seller_by_user(&self, user_id: &str) -> Result<Option<SellerRecord>> {
        database::get_seller_by_user(&self.pool, user_id).await
    }

    async fn get_user_profile(&self, user_id: &str) -> Result<Option<ParticipantProfile>> {
        database::get_user_profile(&self.pool, user_id).await
    }

    async fn get_seller_profile(&self, seller_id: &str) -> Result<Option<ParticipantProfile>> {
        database::get_seller_profile(&self.pool, seller_id).await
    }

    async fn find_conversation(
        &self, client_id: &str, creator_id: &str, project_id: &str, subject_hint: &str,
    ) -> Result<Option<Conversation>> {
        database::find_conversation(&self.pool, client_id, creator_id, project_id, subject_hint)
            .await
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        database::get_conversation(&self.pool, conversation_id).await
    }

    async fn list_conversations(
        &self, side: SenderType, participant_id: &str,
    ) -> Result<Vec<Conversation>> {
        database::list_conversations(&self.pool, side, participant_id).await
    }

    async fn create_seeded_conversation(
        &self, client_id: &str, creator_id: &str, project_id: Option<&str>, subject: &str,
        greeting_sender: (&str, SenderType), greeting: &MessagePayload,
    ) -> Result<Option<(Conversation, Message)>> {
        database::create_seeded_conversation(
            &self.pool, client_id, creator_id, project_id, subject, greeting_sender, greeting,
        )
        .await
    }

    async fn append_message(
        &self, conversation_id: &str, sender_id: &str, sender_type: SenderType,
        payload: &MessagePayload,
    ) -> Result<Option<Message>> {
        database::append_message(&self.pool, conversation_id, sender_id, sender_type, payload).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        database::list_messages(&self.pool, conversation_id).await
    }

    async fn get_message(&self, message_id: &str) -> Result<Option<Message>> {
        database::get_message(&self.pool, message_id).await
    }

    async fn last_message(&self, conversation_id: &str) -> Result<Option<Message>> {
        database::last_message(&self.pool, conversation_id).await
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<bool> {
        database::mark_message_read(&self.pool, message_id).await
    }

    async fn count_unread(&self, conversation_id: &str, excluding: SenderType) -> Result<i64> {
        database::count_unread(&self.pool, conversation_id, excluding).await
    }

    async fn insert_user_notification(
        &self, user_id: &str, kind: NotificationType, title: &str, message: &str,
        data: &serde_json::Value,
    ) -> Result<UserNotification> {
        database::insert_user_notification(&self.pool, user_id, kind, title, message, data).await
    }

    async fn get_unread_notifications(&self, user_id: &str) -> Result<Vec<UserNotification>> {
        database::get_unread_notifications(&self.pool, user_id).await
    }

    async fn mark_notification_read(&self, notification_id: &str, user_id: &str) -> Result<bool> {
        database::mark_notification_read(&self.pool, notification_id, user_id).await
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> Result<u64> {
        database::mark_all_notifications_read(&self.pool, user_id).await
    }

    async fn insert_seller_notification(
        &self, seller_id: &str, kind: NotificationType, title: &str, message: &str,
        data: &serde_json::Value,
    ) -> Result<SellerNotification> {
        database::insert_seller_notification(&self.pool, seller_id, kind, title, message, data)
            .await
    }

    async fn get_unread_seller_notifications(
        &self, seller_id: &str,
    ) -> Result<Vec<SellerNotification>> {
        database::get_unread_seller_notifications(&self.pool, seller_id).await
    }

    async fn insert_quote_offer(&self, quote: &NewQuote<'_>) -> Result<QuoteRecord> {
        database::insert_quote_offer(&self.pool, quote).await
    }

    async fn get_quote_offer(&self, quote_id: &str) -> Result<Option<QuoteRecord>> {
        database::get_quote_offer(&self.pool, quote_id).await
    }

    async fn update_quote_offer(
        &self, quote_id: &str, price: Option<f64>, delivery_days: Option<i64>,
        description: Option<&str>,
    ) -> Result<Option<QuoteRecord>> {
        database::update_quote_offer(&self.pool, quote_id, price, delivery_days, description).await
    }

    async fn set_quote_status(&self, quote_id: &str, status: &str) -> Result<()> {
        database::set_quote_status(&self.pool, quote_id, status).await
    }
}
