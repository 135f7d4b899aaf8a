//! Conversation resolver
//!
//! Guarantees one conversation per (client, creator, project) and seeds a new
//! one with a greeting from the creator. The storage layer's uniqueness
//! constraint is what makes this race-free: a losing concurrent create sees a
//! conflict, writes nothing, and adopts the winner's row.

use miramatch_shared::{Conversation, Message, MessagePayload, ParticipantProfile, SenderType};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{MessageStore, ProjectRecord};
use crate::error::{AppError, AppResult};
use crate::rooms::short;

/// A conversation with the display data of both participants
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConversation {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub client: ParticipantProfile,
    pub creator: ParticipantProfile,
    /// True when this call created the conversation
    pub created: bool,
    /// The greeting, present only when `created`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<Message>,
}

pub struct ConversationResolver {
    store: Arc<dyn MessageStore>,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Find or create the conversation between a project's owner and a creator
    pub async fn resolve_or_create(
        &self,
        project_id: &str,
        creator_seller_id: &str,
    ) -> AppResult<ResolvedConversation> {
        let project = self.project(project_id).await?;
        if self.store.get_seller(creator_seller_id).await?.is_none() {
            return Err(AppError::NotFound("Creator profile"));
        }

        if let Some(existing) = self.find(&project, creator_seller_id).await? {
            return self.with_profiles(existing, false, None).await;
        }

        let greeting = greeting_for(&project.name);
        let created = self
            .store
            .create_seeded_conversation(
                &project.client_id,
                creator_seller_id,
                Some(&project.id),
                &project.name,
                (creator_seller_id, SenderType::Creator),
                &greeting,
            )
            .await?;

        match created {
            Some((conversation, message)) => {
                info!(
                    "Conversation {} created for project {} (creator {})",
                    short(&conversation.id),
                    short(&project.id),
                    short(creator_seller_id)
                );
                self.with_profiles(conversation, true, Some(message)).await
            }
            None => {
                warn!(
                    "Concurrent create for project {} and creator {}, using existing conversation",
                    short(&project.id),
                    short(creator_seller_id)
                );
                let existing = self.find(&project, creator_seller_id).await?.ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!(
                        "conversation missing after uniqueness conflict"
                    ))
                })?;
                self.with_profiles(existing, false, None).await
            }
        }
    }

    /// Look up, without creating, the conversation a creator holds for a project
    pub async fn find_for_creator(
        &self,
        project_id: &str,
        creator_seller_id: &str,
    ) -> AppResult<ResolvedConversation> {
        let project = self.project(project_id).await?;
        let conversation = self
            .find(&project, creator_seller_id)
            .await?
            .ok_or(AppError::NotFound("Conversation"))?;
        self.with_profiles(conversation, false, None).await
    }

    async fn project(&self, project_id: &str) -> AppResult<ProjectRecord> {
        self.store
            .get_project(project_id)
            .await?
            .ok_or(AppError::NotFound("Project"))
    }

    async fn find(
        &self,
        project: &ProjectRecord,
        creator_seller_id: &str,
    ) -> AppResult<Option<Conversation>> {
        Ok(self
            .store
            .find_conversation(&project.client_id, creator_seller_id, &project.id, &project.name)
            .await?)
    }

    async fn with_profiles(
        &self,
        conversation: Conversation,
        created: bool,
        greeting: Option<Message>,
    ) -> AppResult<ResolvedConversation> {
        let client = self
            .store
            .get_user_profile(&conversation.client_id)
            .await?
            .unwrap_or_else(|| ParticipantProfile {
                id: conversation.client_id.clone(),
                name: "Client".to_string(),
                profile_image: None,
            });
        let creator = self
            .store
            .get_seller_profile(&conversation.creator_id)
            .await?
            .ok_or(AppError::NotFound("Creator profile"))?;

        Ok(ResolvedConversation {
            conversation,
            client,
            creator,
            created,
            greeting,
        })
    }
}

/// Opening message a creator sends in a new conversation
pub fn greeting_for(project_name: &str) -> MessagePayload {
    MessagePayload::text(format!(
        "Bonjour ! J'ai bien reçu votre demande pour \"{}\" et je vous ai envoyé ma proposition. \
         N'hésitez pas à me poser vos questions ici.",
        project_name
    ))
}
