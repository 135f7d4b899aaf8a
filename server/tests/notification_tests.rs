//! Notification dispatcher integration tests
//!
//! These tests verify:
//! - Quote submission survives a failing push API
//! - Quote updates notify without pushing
//! - Quotes default to XOF
//! - A quote whose conversation cannot be opened is not recorded
//! - Accepted quotes land in the seller inbox only
//! - new_message notifications depend on room presence
//! - Read-state transitions of the inbox

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::*;
use miramatch_server::database;
use miramatch_server::notifications::push::{PushGateway, PushJob};
use miramatch_server::rooms::RoomMember;
use miramatch_server::AppError;
use miramatch_shared::{MessagePayload, NotificationType, SenderType};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Records every job and fails delivery when `fail` is set
#[derive(Default)]
struct FakeGateway {
    fail: bool,
    jobs: Mutex<Vec<PushJob>>,
}

#[async_trait]
impl PushGateway for FakeGateway {
    async fn deliver(&self, job: &PushJob) -> Result<()> {
        self.jobs.lock().await.push(job.clone());
        if self.fail {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_quote_submission_survives_push_failure() {
    let gateway = Arc::new(FakeGateway {
        fail: true,
        ..Default::default()
    });
    let env = setup_with_gateway(Some(gateway.clone() as Arc<dyn PushGateway>)).await;
    let addr = spawn_server(env.state.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/quotes", addr))
        .bearer_auth(creator_token())
        .json(&json!({
            "projectId": PROJECT_ID,
            "price": 250.0,
            "currency": "EUR",
            "deliveryDays": 10,
            "description": "Or 18 carats"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["quote"]["projectId"], PROJECT_ID);
    assert_eq!(body["conversation"]["created"], true);

    let unread = database::get_unread_notifications(&env.pool, CLIENT_ID).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].kind, NotificationType::NewQuoteOffer);
    assert!(unread[0].message.contains("Atelier Bruno"));
    assert!(unread[0].message.contains(PROJECT_NAME));
    assert_eq!(unread[0].data["price"], 250.0);

    let state = env.state.clone();
    wait_for(move || state.notifications.push_stats().map(|s| s.failed()) == Some(1)).await;

    let jobs = gateway.jobs.lock().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].quote_id, PROJECT_ID);
    assert_eq!(jobs[0].payload.seller_id, SELLER_ID);
    assert_eq!(jobs[0].payload.delivery_time, 10);
}

#[tokio::test]
async fn test_quote_update_notifies_without_push() {
    let gateway = Arc::new(FakeGateway::default());
    let env = setup_with_gateway(Some(gateway.clone() as Arc<dyn PushGateway>)).await;
    let addr = spawn_server(env.state.clone()).await;
    let http = reqwest::Client::new();

    let created: Value = http
        .post(format!("http://{}/quotes", addr))
        .bearer_auth(creator_token())
        .json(&json!({ "projectId": PROJECT_ID, "price": 100, "deliveryDays": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let quote_id = created["quote"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["quote"]["currency"], "XOF");

    let state = env.state.clone();
    wait_for(move || state.notifications.push_stats().map(|s| s.sent()) == Some(1)).await;

    let response = http
        .patch(format!("http://{}/quotes/{}", addr, quote_id))
        .bearer_auth(creator_token())
        .json(&json!({ "price": 120, "deliveryDays": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let unread = database::get_unread_notifications(&env.pool, CLIENT_ID).await.unwrap();
    let updated = unread
        .iter()
        .find(|n| n.kind == NotificationType::QuoteUpdated)
        .unwrap();
    assert!(updated.message.contains("120 XOF, 7 jours"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.jobs.lock().await.len(), 1);
}

#[tokio::test]
async fn test_quote_not_recorded_when_conversation_fails() {
    let env = setup().await;
    let addr = spawn_server(env.state.clone()).await;
    // Opening the conversation writes its greeting, which now fails
    sqlx::query("DROP TABLE messages").execute(&env.pool).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{}/quotes", addr))
        .bearer_auth(creator_token())
        .json(&json!({ "projectId": PROJECT_ID, "price": 80, "deliveryDays": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let quotes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quote_offers")
        .fetch_one(&env.pool)
        .await
        .unwrap();
    assert_eq!(quotes, 0);
    let unread = database::get_unread_notifications(&env.pool, CLIENT_ID).await.unwrap();
    assert!(unread.is_empty());
}

#[tokio::test]
async fn test_other_creator_cannot_update_quote() {
    let env = setup().await;
    let addr = spawn_server(env.state.clone()).await;
    let http = reqwest::Client::new();

    let created: Value = http
        .post(format!("http://{}/quotes", addr))
        .bearer_auth(creator_token())
        .json(&json!({ "projectId": PROJECT_ID, "price": 100, "deliveryDays": 5 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = http
        .patch(format!(
            "http://{}/quotes/{}",
            addr,
            created["quote"]["id"].as_str().unwrap()
        ))
        .bearer_auth(token(OTHER_CREATOR_USER_ID, "CREATOR"))
        .json(&json!({ "price": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_accepted_quote_goes_to_seller_inbox() {
    let env = setup().await;
    let addr = spawn_server(env.state.clone()).await;
    let http = reqwest::Client::new();

    let created: Value = http
        .post(format!("http://{}/quotes", addr))
        .bearer_auth(creator_token())
        .json(&json!({ "projectId": PROJECT_ID, "price": 80, "deliveryDays": 3 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let quote_id = created["quote"]["id"].as_str().unwrap();

    let response = http
        .post(format!("http://{}/quotes/{}/accept", addr, quote_id))
        .bearer_auth(client_token())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["quote"]["status"], "accepted");
    assert_eq!(body["conversation"]["created"], false);

    let seller_inbox = database::get_unread_seller_notifications(&env.pool, SELLER_ID)
        .await
        .unwrap();
    assert_eq!(seller_inbox.len(), 1);
    assert_eq!(seller_inbox[0].kind, NotificationType::QuoteAccepted);
    assert!(seller_inbox[0].message.contains("Alice"));

    // The client inbox only holds the offer notification
    let client_inbox = database::get_unread_notifications(&env.pool, CLIENT_ID).await.unwrap();
    assert!(client_inbox
        .iter()
        .all(|n| n.kind != NotificationType::QuoteAccepted));

    // Creators read their seller inbox through the same route
    let inbox: Value = http
        .get(format!("http://{}/notifications/unread", addr))
        .bearer_auth(creator_token())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(inbox[0]["sellerId"], SELLER_ID);
    assert_eq!(inbox[0]["type"], "quote_accepted");
}

#[tokio::test]
async fn test_duplicate_events_produce_duplicate_notifications() {
    let env = setup().await;
    let notice = miramatch_server::notifications::QuoteOfferNotice {
        client_id: CLIENT_ID.into(),
        creator_seller_id: SELLER_ID.into(),
        project_id: PROJECT_ID.into(),
        quote_id: "quote-1".into(),
        creator_name: "Atelier Bruno".into(),
        project_name: PROJECT_NAME.into(),
        price: 99.5,
        currency: "EUR".into(),
        delivery_days: 4,
        description: String::new(),
    };

    let a = env.state.notifications.notify_new_quote_offer(&notice).await.unwrap();
    let b = env.state.notifications.notify_new_quote_offer(&notice).await.unwrap();
    assert_ne!(a.id, b.id);
    assert!(a.message.contains("99.50 EUR"));
    assert_eq!(env.state.notifications.get_unread(CLIENT_ID).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_new_message_notification_only_when_client_absent() {
    let env = setup().await;
    let conv = open_conversation(&env).await;

    env.state
        .messaging
        .send_message(&creator_identity(), &conv, MessagePayload::text("Vous êtes là ?"))
        .await
        .unwrap();
    let unread = env.state.notifications.get_unread(CLIENT_ID).await.unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].kind, NotificationType::NewMessage);
    assert_eq!(unread[0].data["conversationId"], conv.as_str());

    // Client present in the room: no inbox entry
    let (tx, _rx) = mpsc::channel(8);
    env.state.rooms.join(
        &conv,
        99,
        RoomMember {
            participant_id: CLIENT_ID.into(),
            sender_type: SenderType::Client,
            tx,
        },
    );
    env.state
        .messaging
        .send_message(&creator_identity(), &conv, MessagePayload::text("Parfait"))
        .await
        .unwrap();
    assert_eq!(env.state.notifications.get_unread(CLIENT_ID).await.unwrap().len(), 1);

    // Client messages never notify
    env.state
        .messaging
        .send_message(&client_identity(), &conv, MessagePayload::text("Oui"))
        .await
        .unwrap();
    assert_eq!(env.state.notifications.get_unread(CLIENT_ID).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_read_and_mark_all() {
    let env = setup().await;
    let dispatcher = &env.state.notifications;
    let conv = open_conversation(&env).await;

    for text in ["un", "deux", "trois"] {
        env.state
            .messaging
            .send_message(&creator_identity(), &conv, MessagePayload::text(text))
            .await
            .unwrap();
    }
    let unread = dispatcher.get_unread(CLIENT_ID).await.unwrap();
    assert_eq!(unread.len(), 3);

    let err = dispatcher.mark_read(&unread[0].id, OTHER_CLIENT_ID).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound("Notification")));

    dispatcher.mark_read(&unread[0].id, CLIENT_ID).await.unwrap();
    dispatcher.mark_read(&unread[0].id, CLIENT_ID).await.unwrap();
    assert_eq!(dispatcher.get_unread(CLIENT_ID).await.unwrap().len(), 2);

    assert_eq!(dispatcher.mark_all_read(CLIENT_ID).await.unwrap(), 2);
    assert_eq!(dispatcher.mark_all_read(CLIENT_ID).await.unwrap(), 0);
    assert!(dispatcher.get_unread(CLIENT_ID).await.unwrap().is_empty());
}
