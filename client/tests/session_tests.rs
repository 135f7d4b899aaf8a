//! Client against a live server
//!
//! These tests verify:
//! - Sign-in opens the realtime session, a forged credential is refused
//! - A mounted chat receives the peer's messages through its room
//! - Own sends are not duplicated by the server echo
//! - The creator flow opens a project chat seeded with the greeting

use jsonwebtoken::{encode, EncodingKey, Header};
use miramatch_client::{AppContext, ChatRoom, ClientConfig, ClientError};
use miramatch_server::auth::{Claims, Identity};
use miramatch_server::db::SqliteStore;
use miramatch_server::{database, routing, ServerConfig, ServerState};
use miramatch_shared::{MessagePayload, Role, SenderType};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const SECRET: &str = "client-test-secret";
const CLIENT_ID: &str = "client-1";
const CREATOR_USER_ID: &str = "creator-user-1";
const SELLER_ID: &str = "seller-1";
const PROJECT_ID: &str = "project-1";

async fn start_server() -> (Arc<ServerState>, SocketAddr) {
    let pool = database::init_in_memory().await.unwrap();
    database::upsert_user(&pool, CLIENT_ID, Some("Alice"), None).await.unwrap();
    database::upsert_user(&pool, CREATOR_USER_ID, Some("Bruno"), None).await.unwrap();
    database::upsert_seller(&pool, SELLER_ID, CREATOR_USER_ID, Some("Atelier Bruno"))
        .await
        .unwrap();
    database::upsert_project(&pool, PROJECT_ID, CLIENT_ID, "Bague en or").await.unwrap();

    let state = Arc::new(ServerState::with_push_gateway(
        Arc::new(SqliteStore::new(pool)),
        ServerConfig::local(SECRET),
        None,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routing::create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    (state, addr)
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: chrono::Utc::now().timestamp() + 3600,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn creator() -> Identity {
    Identity {
        user_id: CREATOR_USER_ID.to_string(),
        role: Role::Creator,
        participant_id: SELLER_ID.to_string(),
    }
}

async fn client_app(addr: SocketAddr) -> AppContext {
    let app = AppContext::new(ClientConfig::new(format!("http://{}", addr)));
    app.login(&token(CLIENT_ID, "CLIENT"), Role::Client).await.unwrap();
    app
}

/// Apply updates until `done` holds
async fn pump_until<F: Fn(&ChatRoom) -> bool>(room: &mut ChatRoom, done: F) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !done(&*room) {
            assert!(room.next_update().await.unwrap());
        }
    })
    .await
    .expect("chat never reached the expected state");
}

#[tokio::test]
async fn test_forged_token_fails_login() {
    let (_state, addr) = start_server().await;
    let app = AppContext::new(ClientConfig::new(format!("http://{}", addr)));

    let err = app.login("forged.token.value", Role::Client).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
    assert!(!app.is_signed_in().await);
}

#[tokio::test]
async fn test_chat_receives_peer_message() {
    let (state, addr) = start_server().await;
    let conversation = state
        .resolver
        .resolve_or_create(PROJECT_ID, SELLER_ID)
        .await
        .unwrap()
        .conversation;

    let app = client_app(addr).await;
    assert!(app.session().await.unwrap().is_connected().await);
    let mut room = app.open_chat(&conversation.id).await.unwrap();
    // The greeting is already in the history
    assert_eq!(room.entries().len(), 1);

    // The server only fans out to joined members; wait for the join to land
    pump_until(&mut room, |_| state.rooms.member_count(&conversation.id) == 1).await;

    state
        .messaging
        .send_message(&creator(), &conversation.id, MessagePayload::text("Bonjour"))
        .await
        .unwrap();

    pump_until(&mut room, |r| r.entries().len() == 2).await;
    let received = room.entries()[1].message().unwrap();
    assert_eq!(received.content.as_deref(), Some("Bonjour"));
    assert_eq!(received.sender_type, SenderType::Creator);
    assert!(!received.is_read);

    room.unmount().await;
    app.logout().await;
}

#[tokio::test]
async fn test_own_send_not_duplicated_by_echo() {
    let (state, addr) = start_server().await;
    let conversation = state
        .resolver
        .resolve_or_create(PROJECT_ID, SELLER_ID)
        .await
        .unwrap()
        .conversation;

    let app = client_app(addr).await;
    let mut room = app.open_chat(&conversation.id).await.unwrap();
    pump_until(&mut room, |_| state.rooms.member_count(&conversation.id) == 1).await;

    let sent = room.send_text("Merci !").await.unwrap();
    assert_eq!(room.entries().len(), 2);

    // Drain the echo; it must fold into the confirmed entry
    pump_until(&mut room, |r| r.entries().len() == 2 && !r.entries()[1].is_pending()).await;
    let _ = tokio::time::timeout(Duration::from_millis(300), room.next_update()).await;
    assert_eq!(room.entries().len(), 2);
    assert_eq!(room.entries()[1].message().unwrap().id, sent.id);
}

#[tokio::test]
async fn test_creator_opens_project_chat() {
    let (_state, addr) = start_server().await;
    let app = AppContext::new(ClientConfig::new(format!("http://{}", addr)));
    app.login(&token(CREATOR_USER_ID, "CREATOR"), Role::Creator)
        .await
        .unwrap();

    let room = app.open_project_chat(PROJECT_ID).await.unwrap();
    assert_eq!(room.entries().len(), 1);
    let greeting = room.entries()[0].message().unwrap();
    assert_eq!(greeting.sender_id, SELLER_ID);
    assert!(greeting.content.as_deref().unwrap().contains("Bague en or"));

    let api = app.api().await.unwrap();
    let found = api.find_project_conversation(PROJECT_ID).await.unwrap();
    assert_eq!(found.conversation.id, room.conversation_id());
    assert!(!found.created);
}
