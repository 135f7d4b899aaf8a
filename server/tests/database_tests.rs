//! Message store integration tests
//!
//! These tests verify:
//! - Message ordering and history snapshots
//! - Conversation stamping on append
//! - Unread counting per viewer side
//! - Read-flag idempotency
//! - Conversation uniqueness and legacy subject matching
//! - Notification inbox state
//! - File databases open in WAL mode

mod common;

use common::*;
use miramatch_server::database;
use miramatch_shared::{MessagePayload, MessageType, NotificationType, SenderType};
use serde_json::json;

async fn conversation(pool: &sqlx::SqlitePool) -> String {
    insert_conversation_row(pool, CLIENT_ID, SELLER_ID, Some(PROJECT_ID), PROJECT_NAME).await
}

#[tokio::test]
async fn test_messages_listed_in_persisted_order() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;

    for i in 0..25 {
        let (sender, side) = if i % 2 == 0 {
            (SELLER_ID, SenderType::Creator)
        } else {
            (CLIENT_ID, SenderType::Client)
        };
        database::append_message(&pool, &conv, sender, side, &MessagePayload::text(format!("msg {}", i)))
            .await
            .unwrap()
            .unwrap();
    }

    let first = database::list_messages(&pool, &conv).await.unwrap();
    assert_eq!(first.len(), 25);
    assert!(first.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    for (i, m) in first.iter().enumerate() {
        assert_eq!(m.content.as_deref(), Some(format!("msg {}", i).as_str()));
    }

    let second = database::list_messages(&pool, &conv).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_append_stamps_conversation() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;
    let before = database::get_conversation(&pool, &conv).await.unwrap().unwrap();

    let message = database::append_message(
        &pool,
        &conv,
        CLIENT_ID,
        SenderType::Client,
        &MessagePayload::text("Bonjour"),
    )
    .await
    .unwrap()
    .unwrap();

    let after = database::get_conversation(&pool, &conv).await.unwrap().unwrap();
    assert_eq!(after.last_message_at, message.created_at);
    assert!(after.last_message_at >= before.last_message_at);
}

#[tokio::test]
async fn test_append_to_missing_conversation() {
    let pool = seeded_pool().await;
    let result = database::append_message(
        &pool,
        "no-such-conversation",
        CLIENT_ID,
        SenderType::Client,
        &MessagePayload::text("hello"),
    )
    .await
    .unwrap();

    assert!(result.is_none());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_unread_count_excludes_viewer_own_messages() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;

    for text in ["un", "deux"] {
        database::append_message(&pool, &conv, SELLER_ID, SenderType::Creator, &MessagePayload::text(text))
            .await
            .unwrap();
    }
    database::append_message(&pool, &conv, CLIENT_ID, SenderType::Client, &MessagePayload::text("trois"))
        .await
        .unwrap();

    // The client sees the creator's two messages, the creator the client's one
    assert_eq!(database::count_unread(&pool, &conv, SenderType::Client).await.unwrap(), 2);
    assert_eq!(database::count_unread(&pool, &conv, SenderType::Creator).await.unwrap(), 1);
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;
    let message = database::append_message(
        &pool,
        &conv,
        SELLER_ID,
        SenderType::Creator,
        &MessagePayload::text("Bonjour"),
    )
    .await
    .unwrap()
    .unwrap();

    assert!(database::mark_message_read(&pool, &message.id).await.unwrap());
    assert!(!database::mark_message_read(&pool, &message.id).await.unwrap());

    let stored = database::get_message(&pool, &message.id).await.unwrap().unwrap();
    assert!(stored.is_read);
    assert_eq!(database::count_unread(&pool, &conv, SenderType::Client).await.unwrap(), 0);
}

#[tokio::test]
async fn test_text_and_audio_round_trip() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;

    let text = MessagePayload::text("Voici le croquis").validate(1024).unwrap();
    let audio = MessagePayload::audio("https://cdn.example/clip.m4a", 14)
        .validate(1024)
        .unwrap();

    database::append_message(&pool, &conv, SELLER_ID, SenderType::Creator, &text)
        .await
        .unwrap();
    database::append_message(&pool, &conv, CLIENT_ID, SenderType::Client, &audio)
        .await
        .unwrap();

    let messages = database::list_messages(&pool, &conv).await.unwrap();
    assert_eq!(messages[0].kind, MessageType::Text);
    assert_eq!(messages[0].content, text.content);
    assert_eq!(messages[0].audio_url, None);

    assert_eq!(messages[1].kind, MessageType::Audio);
    assert_eq!(messages[1].content, None);
    assert_eq!(messages[1].audio_url, audio.audio_url);
    assert_eq!(messages[1].audio_duration, Some(14));
    assert_eq!(messages[1].sender_type, SenderType::Client);
}

#[tokio::test]
async fn test_conversation_unique_per_project() {
    let pool = seeded_pool().await;
    conversation(&pool).await;

    let duplicate = database::create_seeded_conversation(
        &pool,
        CLIENT_ID,
        SELLER_ID,
        Some(PROJECT_ID),
        PROJECT_NAME,
        (SELLER_ID, SenderType::Creator),
        &MessagePayload::text("greeting"),
    )
    .await
    .unwrap();
    assert!(duplicate.is_none());

    let other_project = database::create_seeded_conversation(
        &pool,
        CLIENT_ID,
        SELLER_ID,
        Some(OTHER_PROJECT_ID),
        "Collier argent",
        (SELLER_ID, SenderType::Creator),
        &MessagePayload::text("greeting"),
    )
    .await
    .unwrap();
    let (conversation, greeting) = other_project.unwrap();
    assert_eq!(greeting.conversation_id, conversation.id);
}

#[tokio::test]
async fn test_seeded_conversation_conflict_writes_nothing() {
    let pool = seeded_pool().await;
    conversation(&pool).await;

    let result = database::create_seeded_conversation(
        &pool,
        CLIENT_ID,
        SELLER_ID,
        Some(PROJECT_ID),
        PROJECT_NAME,
        (SELLER_ID, SenderType::Creator),
        &MessagePayload::text("greeting"),
    )
    .await
    .unwrap();
    assert!(result.is_none());

    let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(messages, 0);
}

#[tokio::test]
async fn test_legacy_conversation_matched_by_subject() {
    let pool = seeded_pool().await;
    let legacy =
        insert_conversation_row(&pool, CLIENT_ID, SELLER_ID, None, "Demande : Bague en or").await;

    let found = database::find_conversation(&pool, CLIENT_ID, SELLER_ID, PROJECT_ID, PROJECT_NAME)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, legacy);

    let miss = database::find_conversation(
        &pool,
        CLIENT_ID,
        SELLER_ID,
        OTHER_PROJECT_ID,
        "Collier argent",
    )
    .await
    .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn test_conversation_lists_by_side() {
    let pool = seeded_pool().await;
    let conv = conversation(&pool).await;

    let for_creator = database::list_conversations(&pool, SenderType::Creator, SELLER_ID)
        .await
        .unwrap();
    let for_client = database::list_conversations(&pool, SenderType::Client, CLIENT_ID)
        .await
        .unwrap();
    let for_stranger = database::list_conversations(&pool, SenderType::Client, OTHER_CLIENT_ID)
        .await
        .unwrap();

    assert_eq!(for_creator.len(), 1);
    assert_eq!(for_client[0].id, conv);
    assert!(for_stranger.is_empty());
}

#[tokio::test]
async fn test_notification_inbox_state() {
    let pool = seeded_pool().await;
    let data = json!({ "quoteId": "q-1" });

    let first = database::insert_user_notification(
        &pool,
        CLIENT_ID,
        NotificationType::NewQuoteOffer,
        "Nouvelle proposition reçue !",
        "Atelier Bruno a envoyé une proposition",
        &data,
    )
    .await
    .unwrap();
    database::insert_user_notification(
        &pool,
        CLIENT_ID,
        NotificationType::QuoteUpdated,
        "Proposition modifiée",
        "...",
        &data,
    )
    .await
    .unwrap();

    let unread = database::get_unread_notifications(&pool, CLIENT_ID).await.unwrap();
    assert_eq!(unread.len(), 2);
    assert_eq!(unread.iter().find(|n| n.id == first.id).unwrap().data, data);

    // Another user cannot mark it
    assert!(!database::mark_notification_read(&pool, &first.id, OTHER_CLIENT_ID).await.unwrap());
    assert!(database::mark_notification_read(&pool, &first.id, CLIENT_ID).await.unwrap());
    assert!(database::mark_notification_read(&pool, &first.id, CLIENT_ID).await.unwrap());
    assert_eq!(database::get_unread_notifications(&pool, CLIENT_ID).await.unwrap().len(), 1);

    assert_eq!(database::mark_all_notifications_read(&pool, CLIENT_ID).await.unwrap(), 1);
    assert!(database::get_unread_notifications(&pool, CLIENT_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_database_uses_wal_journal() {
    let path = std::env::temp_dir().join(format!("miramatch-{}.db", uuid::Uuid::new_v4()));
    let url = format!("sqlite://{}", path.display());

    let pool = database::init(&url).await.unwrap();
    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode, "wal");

    let busy: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(busy, 5000);

    pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
    }
}
