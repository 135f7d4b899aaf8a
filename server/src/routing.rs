//! HTTP routing configuration

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use miramatch_shared::{
    ConversationSummary, Message, MessagePayload, Role, SellerNotification, UserNotification,
    PROTOCOL_VERSION,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{bearer_token, AuthenticatedUser};
use crate::error::AppResult;
use crate::resolver::ResolvedConversation;
use crate::state::ServerState;

/// Create the application router
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);

    let mut router = Router::new()
        .route("/ws", get(crate::websocket::handle_websocket))
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/conversations", get(list_conversations))
        .route(
            "/conversations/project/:project_id",
            get(find_project_conversation).post(resolve_project_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/messages/:message_id/read", patch(mark_message_read))
        .route("/notifications/unread", get(unread_notifications))
        .route("/notifications/read-all", patch(mark_all_notifications_read))
        .route("/notifications/:notification_id/read", patch(mark_notification_read))
        .route("/quotes", post(crate::quotes::submit_quote))
        .route("/quotes/:quote_id", patch(crate::quotes::update_quote))
        .route("/quotes/:quote_id/accept", post(crate::quotes::accept_quote));

    // Only mount admin endpoint if a token is configured
    if state.config.admin_token.is_some() {
        router = router.route("/admin/stats", get(admin_stats));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build CORS layer from config. Permissive when no origins are configured.
fn build_cors_layer(origins: &Option<String>) -> CorsLayer {
    match origins {
        Some(list) if !list.is_empty() => {
            let parsed: Vec<_> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(parsed))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        _ => CorsLayer::permissive(),
    }
}

/// Health check, no sensitive data
async fn health_check() -> &'static str {
    "OK"
}

async fn server_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "MiraMatch Messaging",
        "protocol_version": PROTOCOL_VERSION,
    }))
}

// ---------------------------------------------------------------------------
// Conversations & messages
// ---------------------------------------------------------------------------

async fn list_conversations(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.messaging.list_conversations(&identity).await?))
}

async fn find_project_conversation(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(project_id): Path<String>,
) -> AppResult<Json<ResolvedConversation>> {
    identity.require_creator()?;
    let resolved = state
        .resolver
        .find_for_creator(&project_id, &identity.participant_id)
        .await?;
    Ok(Json(resolved))
}

async fn resolve_project_conversation(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(project_id): Path<String>,
) -> AppResult<(StatusCode, Json<ResolvedConversation>)> {
    identity.require_creator()?;
    let resolved = state
        .resolver
        .resolve_or_create(&project_id, &identity.participant_id)
        .await?;
    let status = if resolved.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(resolved)))
}

async fn list_messages(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(conversation_id): Path<String>,
) -> AppResult<Json<Vec<Message>>> {
    Ok(Json(
        state
            .messaging
            .list_messages(&identity, &conversation_id)
            .await?,
    ))
}

async fn send_message(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(conversation_id): Path<String>,
    Json(payload): Json<MessagePayload>,
) -> AppResult<(StatusCode, Json<Message>)> {
    let message = state
        .messaging
        .send_message(&identity, &conversation_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn mark_message_read(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(message_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let changed = state
        .messaging
        .mark_read(&identity, &message_id, None)
        .await?;
    Ok(Json(serde_json::json!({ "success": true, "changed": changed })))
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Clients read their user inbox, creators their seller inbox
#[derive(Serialize)]
#[serde(untagged)]
enum Inbox {
    User(Vec<UserNotification>),
    Seller(Vec<SellerNotification>),
}

async fn unread_notifications(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> AppResult<Json<Inbox>> {
    let inbox = match identity.role {
        Role::Client => Inbox::User(state.notifications.get_unread(&identity.user_id).await?),
        Role::Creator => Inbox::Seller(
            state
                .notifications
                .get_unread_for_seller(&identity.participant_id)
                .await?,
        ),
    };
    Ok(Json(inbox))
}

async fn mark_notification_read(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(notification_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    state
        .notifications
        .mark_read(&notification_id, &identity.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn mark_all_notifications_read(
    State(state): State<Arc<ServerState>>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> AppResult<Json<serde_json::Value>> {
    let updated = state.notifications.mark_all_read(&identity.user_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "updated": updated })))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// Admin stats, behind a bearer token
async fn admin_stats(
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let expected = state.config.admin_token.as_deref().ok_or(StatusCode::NOT_FOUND)?;
    let provided = bearer_token(&headers).ok_or(StatusCode::UNAUTHORIZED)?;

    // Constant-time comparison to prevent timing attacks
    use subtle::ConstantTimeEq;
    if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let push = state.notifications.push_stats();
    Ok(Json(serde_json::json!({
        "connections": state.connection_count(),
        "authenticated_sessions": state.connections.len(),
        "active_rooms": state.rooms.room_count(),
        "max_connections": state.config.max_connections,
        "push_enabled": push.is_some(),
        "push_sent": push.map(|p| p.sent()).unwrap_or(0),
        "push_failed": push.map(|p| p.failed()).unwrap_or(0),
        "push_dropped": push.map(|p| p.dropped()).unwrap_or(0),
    })))
}
