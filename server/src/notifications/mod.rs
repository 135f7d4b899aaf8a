//! Notification dispatcher
//!
//! Turns quote and message events into durable in-app notifications, and
//! queues external pushes. Every `notify_*` method is non-blocking for its
//! caller: failures are logged and reported as `None`, never as an error.

pub mod push;

use miramatch_shared::{Message, MessageType, NotificationType, SellerNotification, UserNotification};
use serde_json::json;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info};

use crate::db::MessageStore;
use crate::error::{AppError, AppResult};
use crate::rooms::short;
use push::{PushJob, PushQueue, PushStats, QuoteOfferPush};

/// Everything the quote flow knows about an offer when it fires an event
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteOfferNotice {
    pub client_id: String,
    pub creator_seller_id: String,
    pub project_id: String,
    pub quote_id: String,
    pub creator_name: String,
    pub project_name: String,
    pub price: f64,
    pub currency: String,
    pub delivery_days: i64,
    pub description: String,
}

pub struct NotificationDispatcher {
    store: Arc<dyn MessageStore>,
    push: RwLock<Option<PushQueue>>,
    push_stats: Option<Arc<PushStats>>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn MessageStore>, push: Option<PushQueue>) -> Self {
        let push_stats = push.as_ref().map(PushQueue::stats);
        Self {
            store,
            push: RwLock::new(push),
            push_stats,
        }
    }

    /// Record a `new_quote_offer` notification for the client and queue a push
    pub async fn notify_new_quote_offer(&self, notice: &QuoteOfferNotice) -> Option<UserNotification> {
        let title = "Nouvelle proposition reçue !";
        let message = format!(
            "{} a envoyé une proposition de {} {} pour \"{}\"",
            notice.creator_name,
            format_price(notice.price),
            notice.currency,
            notice.project_name
        );

        let created = self
            .record_for_user(
                &notice.client_id,
                NotificationType::NewQuoteOffer,
                title,
                &message,
                quote_data(notice),
            )
            .await;

        self.enqueue_push(PushJob {
            user_id: notice.client_id.clone(),
            quote_id: notice.project_id.clone(),
            payload: QuoteOfferPush {
                seller_id: notice.creator_seller_id.clone(),
                price: notice.price,
                delivery_time: notice.delivery_days,
                description: notice.description.clone(),
                currency: notice.currency.clone(),
            },
        });

        created
    }

    /// Record a `quote_updated` notification for the client. No push.
    pub async fn notify_quote_updated(&self, notice: &QuoteOfferNotice) -> Option<UserNotification> {
        let title = "Proposition modifiée";
        let message = format!(
            "{} a modifié sa proposition pour \"{}\" - {} {}, {} jours",
            notice.creator_name,
            notice.project_name,
            format_price(notice.price),
            notice.currency,
            notice.delivery_days
        );

        self.record_for_user(
            &notice.client_id,
            NotificationType::QuoteUpdated,
            title,
            &message,
            quote_data(notice),
        )
        .await
    }

    /// Record a `quote_accepted` notification in the seller's own inbox
    pub async fn notify_quote_accepted(
        &self,
        creator_seller_id: &str,
        quote_id: &str,
        project_name: &str,
        client_name: &str,
    ) -> Option<SellerNotification> {
        let title = "Offre acceptée !";
        let message = format!(
            "{} a accepté votre proposition pour \"{}\"",
            client_name, project_name
        );
        let data = json!({
            "quoteId": quote_id,
            "projectName": project_name,
            "clientName": client_name,
        });

        match self
            .store
            .insert_seller_notification(
                creator_seller_id,
                NotificationType::QuoteAccepted,
                title,
                &message,
                &data,
            )
            .await
        {
            Ok(n) => {
                info!("Quote accepted notification stored for seller {}", short(creator_seller_id));
                Some(n)
            }
            Err(e) => {
                error!(
                    "Failed to store seller notification for {}: {:#}",
                    short(creator_seller_id),
                    e
                );
                None
            }
        }
    }

    /// Record a `new_message` notification for a client who is not in the room
    pub async fn notify_new_message(
        &self,
        client_id: &str,
        sender_name: &str,
        message: &Message,
    ) -> Option<UserNotification> {
        let preview = match message.kind {
            MessageType::Text => preview(message.content.as_deref().unwrap_or_default()),
            MessageType::Audio => "Message vocal".to_string(),
        };
        let data = json!({
            "conversationId": message.conversation_id,
            "messageId": message.id,
            "senderId": message.sender_id,
        });

        self.record_for_user(
            client_id,
            NotificationType::NewMessage,
            &format!("Nouveau message de {}", sender_name),
            &preview,
            data,
        )
        .await
    }

    pub async fn get_unread(&self, user_id: &str) -> AppResult<Vec<UserNotification>> {
        Ok(self.store.get_unread_notifications(user_id).await?)
    }

    pub async fn get_unread_for_seller(&self, seller_id: &str) -> AppResult<Vec<SellerNotification>> {
        Ok(self.store.get_unread_seller_notifications(seller_id).await?)
    }

    /// Mark one of the user's notifications read. Already-read is fine.
    pub async fn mark_read(&self, notification_id: &str, user_id: &str) -> AppResult<()> {
        if self.store.mark_notification_read(notification_id, user_id).await? {
            debug!("Notification {} marked read", short(notification_id));
            Ok(())
        } else {
            Err(AppError::NotFound("Notification"))
        }
    }

    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        let count = self.store.mark_all_notifications_read(user_id).await?;
        debug!("{} notifications marked read for {}", count, short(user_id));
        Ok(count)
    }

    pub fn push_stats(&self) -> Option<&PushStats> {
        self.push_stats.as_deref()
    }

    /// Stop accepting pushes. The worker finishes queued jobs, then exits.
    pub fn close_push(&self) {
        let mut guard = self.push.write().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            info!("Push queue closed");
        }
    }

    fn enqueue_push(&self, job: PushJob) {
        let guard = self.push.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(queue) => {
                queue.enqueue(job);
            }
            None => debug!("Push disabled, skipping push for quote {}", short(&job.quote_id)),
        }
    }

    async fn record_for_user(
        &self,
        user_id: &str,
        kind: NotificationType,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Option<UserNotification> {
        match self
            .store
            .insert_user_notification(user_id, kind, title, message, &data)
            .await
        {
            Ok(n) => {
                info!("{} notification stored for user {}", kind.as_str(), short(user_id));
                Some(n)
            }
            Err(e) => {
                error!(
                    "Failed to store {} notification for {}: {:#}",
                    kind.as_str(),
                    short(user_id),
                    e
                );
                None
            }
        }
    }
}

fn quote_data(notice: &QuoteOfferNotice) -> serde_json::Value {
    json!({
        "quoteId": notice.quote_id,
        "projectId": notice.project_id,
        "projectName": notice.project_name,
        "sellerName": notice.creator_name,
        "price": notice.price,
        "currency": notice.currency,
        "deliveryDays": notice.delivery_days,
    })
}

/// Whole prices print without decimals
fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{:.0}", price)
    } else {
        format!("{:.2}", price)
    }
}

fn preview(content: &str) -> String {
    const MAX_CHARS: usize = 80;
    if content.chars().count() <= MAX_CHARS {
        content.to_string()
    } else {
        let cut: String = content.chars().take(MAX_CHARS).collect();
        format!("{}…", cut)
    }
}
