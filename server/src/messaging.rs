//! Message send, history and read receipts
//!
//! The REST routes and the websocket handler both go through
//! [`MessagingService`], so a message is always persisted before it is
//! broadcast and `senderType` always comes from the authenticated identity.

use miramatch_shared::{
    Conversation, ConversationSummary, Message, MessagePayload, ParticipantProfile, SenderType,
    ServerEvent,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::Identity;
use crate::db::MessageStore;
use crate::error::{AppError, AppResult};
use crate::notifications::NotificationDispatcher;
use crate::rooms::{short, ConnectionId, Rooms};

pub struct MessagingService {
    store: Arc<dyn MessageStore>,
    rooms: Arc<Rooms>,
    notifications: Arc<NotificationDispatcher>,
    max_message_size: usize,
}

impl MessagingService {
    pub fn new(
        store: Arc<dyn MessageStore>,
        rooms: Arc<Rooms>,
        notifications: Arc<NotificationDispatcher>,
        max_message_size: usize,
    ) -> Self {
        Self {
            store,
            rooms,
            notifications,
            max_message_size,
        }
    }

    /// The conversation, if `identity` participates in it on its own side
    pub async fn conversation_for(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> AppResult<Conversation> {
        let conversation = self
            .store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("Conversation"))?;

        match conversation.side_of(&identity.participant_id) {
            Some(side) if side == identity.sender_type() => Ok(conversation),
            _ => Err(AppError::Forbidden("Not a participant of this conversation".into())),
        }
    }

    /// Conversations of the caller, most recent activity first
    pub async fn list_conversations(&self, identity: &Identity) -> AppResult<Vec<ConversationSummary>> {
        let viewer = identity.sender_type();
        let conversations = self
            .store
            .list_conversations(viewer, &identity.participant_id)
            .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let counterpart = self.counterpart(&conversation, viewer).await?;
            let last_message = self.store.last_message(&conversation.id).await?;
            let unread_count = self.store.count_unread(&conversation.id, viewer).await?;
            summaries.push(ConversationSummary {
                conversation,
                counterpart,
                last_message,
                unread_count,
            });
        }
        Ok(summaries)
    }

    pub async fn list_messages(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> AppResult<Vec<Message>> {
        let conversation = self.conversation_for(identity, conversation_id).await?;
        Ok(self.store.list_messages(&conversation.id).await?)
    }

    /// Persist a message, then fan it out to every member of the room,
    /// the sender's own connections included.
    pub async fn send_message(
        &self,
        identity: &Identity,
        conversation_id: &str,
        payload: MessagePayload,
    ) -> AppResult<Message> {
        let payload = payload.validate(self.max_message_size)?;
        let conversation = self.conversation_for(identity, conversation_id).await?;

        let message = self
            .store
            .append_message(
                &conversation.id,
                &identity.participant_id,
                identity.sender_type(),
                &payload,
            )
            .await?
            .ok_or(AppError::NotFound("Conversation"))?;

        let delivered = self.rooms.broadcast(
            &conversation.id,
            &ServerEvent::NewMessage {
                message: message.clone(),
            },
            None,
        );
        info!(
            "Message {} stored in {} by {} ({} live recipients)",
            short(&message.id),
            short(&conversation.id),
            message.sender_type,
            delivered
        );

        if message.sender_type == SenderType::Creator
            && !self.rooms.has_side(&conversation.id, SenderType::Client)
        {
            let sender_name = self
                .store
                .get_seller_profile(&message.sender_id)
                .await
                .ok()
                .flatten()
                .map(|p| p.name)
                .unwrap_or_else(|| "Créateur".to_string());
            self.notifications
                .notify_new_message(&conversation.client_id, &sender_name, &message)
                .await;
        }

        Ok(message)
    }

    /// Mark a message read on behalf of the other side.
    ///
    /// Returns true only when the flag flipped. Reading one's own message,
    /// or reading twice, changes nothing. `origin` is the reader's connection,
    /// which is left out of the `message_read` fan-out.
    pub async fn mark_read(
        &self,
        identity: &Identity,
        message_id: &str,
        origin: Option<ConnectionId>,
    ) -> AppResult<bool> {
        let message = self
            .store
            .get_message(message_id)
            .await?
            .ok_or(AppError::NotFound("Message"))?;
        let conversation = self.conversation_for(identity, &message.conversation_id).await?;

        if message.sender_type == identity.sender_type() {
            debug!("Ignoring read of own message {}", short(message_id));
            return Ok(false);
        }

        let flipped = self.store.mark_message_read(message_id).await?;
        if flipped {
            self.rooms.broadcast(
                &conversation.id,
                &ServerEvent::MessageRead {
                    message_id: message.id.clone(),
                    conversation_id: conversation.id.clone(),
                    read_by: identity.participant_id.clone(),
                },
                origin,
            );
            debug!("Message {} read by {}", short(message_id), short(&identity.participant_id));
        }
        Ok(flipped)
    }

    async fn counterpart(
        &self,
        conversation: &Conversation,
        viewer: SenderType,
    ) -> AppResult<ParticipantProfile> {
        let profile = match viewer {
            SenderType::Creator => self.store.get_user_profile(&conversation.client_id).await?,
            SenderType::Client => self.store.get_seller_profile(&conversation.creator_id).await?,
        };

        Ok(profile.unwrap_or_else(|| {
            let (id, name) = match viewer {
                SenderType::Creator => (&conversation.client_id, "Client"),
                SenderType::Client => (&conversation.creator_id, "Créateur"),
            };
            ParticipantProfile {
                id: id.clone(),
                name: name.to_string(),
                profile_image: None,
            }
        }))
    }
}
