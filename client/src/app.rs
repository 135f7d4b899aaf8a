//! Application context
//!
//! Owns the signed-in account: its REST client and its realtime session.
//! Signing in opens the session and signing out closes it; screens get the
//! session from here instead of reaching for a global.

use miramatch_shared::Role;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::{ConversationApi, HttpApi};
use crate::chat::ChatRoom;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::{RealtimeLink, RealtimeSession};

struct Account {
    role: Role,
    api: Arc<HttpApi>,
    session: RealtimeSession,
}

pub struct AppContext {
    config: ClientConfig,
    account: RwLock<Option<Account>>,
}

impl AppContext {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            account: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Sign in with a bearer credential and open the realtime session.
    ///
    /// A rejected handshake fails the sign-in. An unreachable socket does
    /// not: REST keeps working and chat screens retry the connection.
    pub async fn login(&self, token: &str, role: Role) -> Result<()> {
        self.logout().await;

        let api = Arc::new(HttpApi::new(&self.config.api_base_url, token));
        let session = RealtimeSession::new(self.config.clone(), token);
        match session.connect().await {
            Ok(()) => {}
            Err(e @ ClientError::Api { .. }) => return Err(e),
            Err(e) => warn!("Realtime session unavailable at sign-in: {}", e),
        }

        *self.account.write().await = Some(Account { role, api, session });
        info!("Signed in as {:?}", role);
        Ok(())
    }

    /// Close the session and forget the account
    pub async fn logout(&self) {
        let previous = self.account.write().await.take();
        if let Some(account) = previous {
            account.session.disconnect().await;
            info!("Signed out");
        }
    }

    pub async fn is_signed_in(&self) -> bool {
        self.account.read().await.is_some()
    }

    pub async fn role(&self) -> Option<Role> {
        self.account.read().await.as_ref().map(|a| a.role)
    }

    pub async fn session(&self) -> Result<RealtimeSession> {
        self.account
            .read()
            .await
            .as_ref()
            .map(|a| a.session.clone())
            .ok_or(ClientError::NotConnected)
    }

    pub async fn api(&self) -> Result<Arc<dyn ConversationApi>> {
        self.account
            .read()
            .await
            .as_ref()
            .map(|a| a.api.clone() as Arc<dyn ConversationApi>)
            .ok_or(ClientError::NotConnected)
    }

    /// Mount a chat screen for a conversation
    pub async fn open_chat(&self, conversation_id: &str) -> Result<ChatRoom> {
        let (role, api, session) = {
            let guard = self.account.read().await;
            let account = guard.as_ref().ok_or(ClientError::NotConnected)?;
            (account.role, account.api.clone(), account.session.clone())
        };

        ChatRoom::mount(
            conversation_id,
            role.sender_type(),
            api as Arc<dyn ConversationApi>,
            Arc::new(session) as Arc<dyn RealtimeLink>,
            self.config.typing_quiet_interval,
        )
        .await
    }

    /// Creator flow: open (creating if needed) the chat for a project
    pub async fn open_project_chat(&self, project_id: &str) -> Result<ChatRoom> {
        let conversation = self.api().await?.open_project_conversation(project_id).await?;
        self.open_chat(&conversation.conversation.id).await
    }

    /// Unread notification count for the badge
    pub async fn unread_badge(&self) -> Result<usize> {
        Ok(self.api().await?.unread_notifications().await?.len())
    }
}
