//! REST client for the durable conversation surface
//!
//! History, sends and read state all go through here. The realtime session
//! only carries hints on top; whatever this API returns is the source of
//! truth for ordering.

use async_trait::async_trait;
use miramatch_shared::{
    Conversation, ConversationSummary, Message, MessagePayload, ParticipantProfile,
    SellerNotification, UserNotification,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, Result};

/// A project conversation with both participants' display data
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConversation {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub client: ParticipantProfile,
    pub creator: ParticipantProfile,
    /// True when the request created it
    pub created: bool,
    #[serde(default)]
    pub greeting: Option<Message>,
}

/// Unread notifications of the signed-in account
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbox {
    User(Vec<UserNotification>),
    Seller(Vec<SellerNotification>),
}

impl Inbox {
    pub fn len(&self) -> usize {
        match self {
            Inbox::User(items) => items.len(),
            Inbox::Seller(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Operations of the conversation REST surface
#[async_trait]
pub trait ConversationApi: Send + Sync {
    /// My conversations, most recent first
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>>;

    /// Existing conversation of the calling creator for a project
    async fn find_project_conversation(&self, project_id: &str) -> Result<ProjectConversation>;

    /// Conversation of the calling creator for a project, created if absent
    async fn open_project_conversation(&self, project_id: &str) -> Result<ProjectConversation>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Persist a message; the server also fans it out to the room
    async fn send_message(&self, conversation_id: &str, payload: &MessagePayload)
        -> Result<Message>;

    async fn mark_message_read(&self, message_id: &str) -> Result<()>;

    async fn unread_notifications(&self) -> Result<Inbox>;

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()>;

    /// Returns how many notifications flipped
    async fn mark_all_notifications_read(&self) -> Result<u64>;
}

/// [`ConversationApi`] over HTTP with a bearer credential
pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct MarkAllResponse {
    #[serde(default)]
    updated: u64,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("Request failed").to_string(),
        };
        debug!("API {} -> {}: {}", status.as_u16(), status, message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        Ok(self.execute(request).await?.json().await?)
    }
}

#[async_trait]
impl ConversationApi for HttpApi {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.json(self.http.get(self.url("/conversations"))).await
    }

    async fn find_project_conversation(&self, project_id: &str) -> Result<ProjectConversation> {
        let url = self.url(&format!("/conversations/project/{}", project_id));
        self.json(self.http.get(url)).await
    }

    async fn open_project_conversation(&self, project_id: &str) -> Result<ProjectConversation> {
        let url = self.url(&format!("/conversations/project/{}", project_id));
        self.json(self.http.post(url)).await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        self.json(self.http.get(url)).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        payload: &MessagePayload,
    ) -> Result<Message> {
        let url = self.url(&format!("/conversations/{}/messages", conversation_id));
        self.json(self.http.post(url).json(payload)).await
    }

    async fn mark_message_read(&self, message_id: &str) -> Result<()> {
        let url = self.url(&format!("/conversations/messages/{}/read", message_id));
        self.execute(self.http.patch(url)).await?;
        Ok(())
    }

    async fn unread_notifications(&self) -> Result<Inbox> {
        self.json(self.http.get(self.url("/notifications/unread"))).await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<()> {
        let url = self.url(&format!("/notifications/{}/read", notification_id));
        self.execute(self.http.patch(url)).await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self) -> Result<u64> {
        let response: MarkAllResponse = self
            .json(self.http.patch(self.url("/notifications/read-all")))
            .await?;
        Ok(response.updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_project_conversation_shape() {
        let body = json!({
            "id": "conv-1",
            "clientId": "client-1",
            "creatorId": "seller-1",
            "projectId": "project-1",
            "subject": "Bague en or",
            "lastMessageAt": "2026-01-05T10:00:00Z",
            "createdAt": "2026-01-05T10:00:00Z",
            "client": { "id": "client-1", "name": "Alice" },
            "creator": { "id": "seller-1", "name": "Atelier Bruno" },
            "created": false
        });
        let parsed: ProjectConversation = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.conversation.id, "conv-1");
        assert_eq!(parsed.creator.name, "Atelier Bruno");
        assert!(parsed.greeting.is_none());
    }

    #[test]
    fn test_inbox_distinguishes_seller_records() {
        let seller = json!([{
            "id": "n-1",
            "sellerId": "seller-1",
            "type": "quote_accepted",
            "title": "Proposition acceptée",
            "message": "Alice a accepté",
            "data": {},
            "isRead": false,
            "createdAt": "2026-01-05T10:00:00Z"
        }]);
        let inbox: Inbox = serde_json::from_value(seller).unwrap();
        assert!(matches!(inbox, Inbox::Seller(ref items) if items.len() == 1));

        let empty: Inbox = serde_json::from_value(json!([])).unwrap();
        assert!(empty.is_empty());
    }
}
