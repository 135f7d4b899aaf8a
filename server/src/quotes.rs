//! Quote event hooks
//!
//! Just enough of the quote lifecycle to drive conversations and
//! notifications: submitting an offer, revising it, and accepting it.
//! Notification failures never fail these requests.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::db::{NewQuote, QuoteRecord};
use crate::error::{AppError, AppResult};
use crate::notifications::QuoteOfferNotice;
use crate::resolver::ResolvedConversation;
use crate::rooms::short;
use crate::state::ServerState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitQuote {
    pub project_id: String,
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub delivery_days: i64,
    #[serde(default)]
    pub description: String,
}

fn default_currency() -> String {
    "XOF".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuote {
    pub price: Option<f64>,
    pub delivery_days: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub id: String,
    pub project_id: String,
    pub seller_id: String,
    pub price: f64,
    pub currency: String,
    pub delivery_days: i64,
    pub description: String,
    pub status: String,
}

impl From<QuoteRecord> for QuoteView {
    fn from(q: QuoteRecord) -> Self {
        Self {
            id: q.id,
            project_id: q.project_id,
            seller_id: q.seller_id,
            price: q.price,
            currency: q.currency,
            delivery_days: q.delivery_days,
            description: q.description,
            status: q.status,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteOutcome {
    pub quote: QuoteView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ResolvedConversation>,
}

fn validate_terms(price: Option<f64>, delivery_days: Option<i64>) -> AppResult<()> {
    if let Some(price) = price {
        if !price.is_finite() || price <= 0.0 {
            return Err(AppError::Validation("price must be positive".into()));
        }
    }
    if let Some(days) = delivery_days {
        if days <= 0 {
            return Err(AppError::Validation("deliveryDays must be positive".into()));
        }
    }
    Ok(())
}

/// Creator submits an offer: open the conversation, record the offer, notify the client
pub async fn submit_quote(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Json(body): Json<SubmitQuote>,
) -> AppResult<(StatusCode, Json<QuoteOutcome>)> {
    identity.require_creator()?;
    validate_terms(Some(body.price), Some(body.delivery_days))?;

    let project = state
        .store
        .get_project(&body.project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    // No offer is recorded unless its conversation exists
    let conversation = state
        .resolver
        .resolve_or_create(&project.id, &identity.participant_id)
        .await?;

    let quote = state
        .store
        .insert_quote_offer(&NewQuote {
            project_id: &project.id,
            seller_id: &identity.participant_id,
            price: body.price,
            currency: &body.currency,
            delivery_days: body.delivery_days,
            description: &body.description,
        })
        .await?;
    info!(
        "Quote {} submitted on project {} by {}",
        short(&quote.id),
        short(&project.id),
        short(&identity.participant_id)
    );

    let notice = QuoteOfferNotice {
        client_id: project.client_id.clone(),
        creator_seller_id: identity.participant_id.clone(),
        project_id: project.id.clone(),
        quote_id: quote.id.clone(),
        creator_name: conversation.creator.name.clone(),
        project_name: project.name.clone(),
        price: quote.price,
        currency: quote.currency.clone(),
        delivery_days: quote.delivery_days,
        description: quote.description.clone(),
    };
    state.notifications.notify_new_quote_offer(&notice).await;

    Ok((
        StatusCode::CREATED,
        Json(QuoteOutcome {
            quote: quote.into(),
            conversation: Some(conversation),
        }),
    ))
}

/// Creator revises an offer; the client is told, without a push
pub async fn update_quote(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(quote_id): Path<String>,
    Json(body): Json<UpdateQuote>,
) -> AppResult<Json<QuoteOutcome>> {
    identity.require_creator()?;
    validate_terms(body.price, body.delivery_days)?;

    let existing = state
        .store
        .get_quote_offer(&quote_id)
        .await?
        .ok_or(AppError::NotFound("Quote"))?;
    if existing.seller_id != identity.participant_id {
        return Err(AppError::Forbidden("Not your quote".into()));
    }

    let quote = state
        .store
        .update_quote_offer(
            &quote_id,
            body.price,
            body.delivery_days,
            body.description.as_deref(),
        )
        .await?
        .ok_or(AppError::NotFound("Quote"))?;

    let project = state
        .store
        .get_project(&quote.project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    let creator_name = state
        .store
        .get_seller_profile(&quote.seller_id)
        .await?
        .map(|p| p.name)
        .unwrap_or_else(|| "Créateur".to_string());

    let notice = QuoteOfferNotice {
        client_id: project.client_id,
        creator_seller_id: quote.seller_id.clone(),
        project_id: project.id,
        quote_id: quote.id.clone(),
        creator_name,
        project_name: project.name,
        price: quote.price,
        currency: quote.currency.clone(),
        delivery_days: quote.delivery_days,
        description: quote.description.clone(),
    };
    state.notifications.notify_quote_updated(&notice).await;

    Ok(Json(QuoteOutcome {
        quote: quote.into(),
        conversation: None,
    }))
}

/// Project owner accepts an offer: the creator is told in the seller inbox
pub async fn accept_quote(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(quote_id): Path<String>,
) -> AppResult<Json<QuoteOutcome>> {
    identity.require_client()?;

    let quote = state
        .store
        .get_quote_offer(&quote_id)
        .await?
        .ok_or(AppError::NotFound("Quote"))?;
    let project = state
        .store
        .get_project(&quote.project_id)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    if project.client_id != identity.participant_id {
        return Err(AppError::Forbidden("Not your project".into()));
    }

    state.store.set_quote_status(&quote.id, "accepted").await?;
    let conversation = state
        .resolver
        .resolve_or_create(&project.id, &quote.seller_id)
        .await?;

    state
        .notifications
        .notify_quote_accepted(
            &quote.seller_id,
            &quote.id,
            &project.name,
            &conversation.client.name,
        )
        .await;
    info!("Quote {} accepted on project {}", short(&quote.id), short(&project.id));

    let quote = QuoteRecord {
        status: "accepted".to_string(),
        ..quote
    };
    Ok(Json(QuoteOutcome {
        quote: quote.into(),
        conversation: Some(conversation),
    }))
}
