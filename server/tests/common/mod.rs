//! Shared fixtures for server integration tests

#![allow(dead_code)]

use jsonwebtoken::{encode, EncodingKey, Header};
use miramatch_server::auth::{Claims, Identity};
use miramatch_server::db::SqliteStore;
use miramatch_server::notifications::push::PushGateway;
use miramatch_server::{database, routing, ServerConfig, ServerState};
use miramatch_shared::Role;
use sqlx::{Pool, Sqlite};
use std::net::SocketAddr;
use std::sync::Arc;

pub const SECRET: &str = "integration-test-secret";

pub const CLIENT_ID: &str = "client-1";
pub const OTHER_CLIENT_ID: &str = "client-2";
pub const CREATOR_USER_ID: &str = "creator-user-1";
pub const SELLER_ID: &str = "seller-1";
pub const OTHER_CREATOR_USER_ID: &str = "creator-user-2";
pub const OTHER_SELLER_ID: &str = "seller-2";
pub const PROJECT_ID: &str = "project-1";
pub const PROJECT_NAME: &str = "Bague en or";
pub const OTHER_PROJECT_ID: &str = "project-2";

pub struct TestEnv {
    pub pool: Pool<Sqlite>,
    pub state: Arc<ServerState>,
}

/// In-memory database with two clients, two sellers and two projects
pub async fn seeded_pool() -> Pool<Sqlite> {
    let pool = database::init_in_memory().await.unwrap();

    database::upsert_user(&pool, CLIENT_ID, Some("Alice"), None).await.unwrap();
    database::upsert_user(&pool, OTHER_CLIENT_ID, Some("Chloé"), None).await.unwrap();
    database::upsert_user(&pool, CREATOR_USER_ID, Some("Bruno"), Some("https://cdn/b.png"))
        .await
        .unwrap();
    database::upsert_user(&pool, OTHER_CREATOR_USER_ID, Some("Denise"), None).await.unwrap();
    database::upsert_seller(&pool, SELLER_ID, CREATOR_USER_ID, Some("Atelier Bruno"))
        .await
        .unwrap();
    database::upsert_seller(&pool, OTHER_SELLER_ID, OTHER_CREATOR_USER_ID, None)
        .await
        .unwrap();
    database::upsert_project(&pool, PROJECT_ID, CLIENT_ID, PROJECT_NAME).await.unwrap();
    database::upsert_project(&pool, OTHER_PROJECT_ID, CLIENT_ID, "Collier argent")
        .await
        .unwrap();

    pool
}

/// Write a bare conversation row with no opening message, the way rows
/// created before greetings existed look
pub async fn insert_conversation_row(
    pool: &Pool<Sqlite>,
    client_id: &str,
    creator_id: &str,
    project_id: Option<&str>,
    subject: &str,
) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp_millis();
    sqlx::query(
        "INSERT INTO conversations (id, client_id, creator_id, project_id, subject, last_message_at, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
    )
    .bind(&id)
    .bind(client_id)
    .bind(creator_id)
    .bind(project_id)
    .bind(subject)
    .bind(now)
    .execute(pool)
    .await
    .unwrap();
    id
}

pub async fn setup() -> TestEnv {
    setup_with_gateway(None).await
}

pub async fn setup_with_gateway(gateway: Option<Arc<dyn PushGateway>>) -> TestEnv {
    let pool = seeded_pool().await;
    let store = Arc::new(SqliteStore::new(pool.clone()));
    let state = Arc::new(ServerState::with_push_gateway(
        store,
        ServerConfig::local(SECRET),
        gateway,
    ));
    TestEnv { pool, state }
}

pub fn token(sub: &str, role: &str) -> String {
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

pub fn client_token() -> String {
    token(CLIENT_ID, "CLIENT")
}

pub fn creator_token() -> String {
    token(CREATOR_USER_ID, "CREATOR")
}

pub fn client_identity() -> Identity {
    Identity {
        user_id: CLIENT_ID.to_string(),
        role: Role::Client,
        participant_id: CLIENT_ID.to_string(),
    }
}

pub fn creator_identity() -> Identity {
    Identity {
        user_id: CREATOR_USER_ID.to_string(),
        role: Role::Creator,
        participant_id: SELLER_ID.to_string(),
    }
}

/// Serve the full router on an ephemeral port
pub async fn spawn_server(state: Arc<ServerState>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = routing::create_router(state);
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Conversation between client-1 and seller-1 on project-1
pub async fn open_conversation(env: &TestEnv) -> String {
    env.state
        .resolver
        .resolve_or_create(PROJECT_ID, SELLER_ID)
        .await
        .unwrap()
        .conversation
        .id
}
