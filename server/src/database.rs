//! Database operations

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use miramatch_shared::{
    Conversation, Message, MessagePayload, NotificationType, ParticipantProfile,
    SellerNotification, SenderType, UserNotification,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqliteConnection};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Initialize the database connection pool
pub async fn init(database_url: &str) -> Result<Pool<Sqlite>> {
    // Create database file if it doesn't exist
    if !sqlx::Sqlite::database_exists(database_url).await.unwrap_or(false) {
        info!("Creating database at {}", database_url);
        sqlx::Sqlite::create_database(database_url).await?;
    }

    // Journal in WAL mode; main checkpoints it on shutdown
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool with migrations applied
pub async fn init_in_memory() -> Result<Pool<Sqlite>> {
    // One connection: every pooled connection would otherwise get its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    info!("Running database migrations");

    // Identity and project tables are owned by the account/project services;
    // only the columns read here are declared.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT,
            image TEXT,
            created_at INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sellers (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            display_name TEXT,
            FOREIGN KEY (user_id) REFERENCES users(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (client_id) REFERENCES users(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quote_offers (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            seller_id TEXT NOT NULL,
            price REAL NOT NULL,
            currency TEXT NOT NULL,
            delivery_days INTEGER NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id),
            FOREIGN KEY (seller_id) REFERENCES sellers(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // One conversation per (client, creator, project). NULL project ids are
    // distinct under SQLite UNIQUE, which keeps pre-project rows legal.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            creator_id TEXT NOT NULL,
            project_id TEXT,
            subject TEXT NOT NULL,
            last_message_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (client_id, creator_id, project_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_conversations_creator
        ON conversations(creator_id, last_message_at);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_conversations_client
        ON conversations(client_id, last_message_at);
        "#,
    )
    .execute(pool)
    .await?;

    // `seq` breaks ties between messages stamped in the same millisecond
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            conversation_id TEXT NOT NULL,
            sender_id TEXT NOT NULL,
            sender_type TEXT NOT NULL,
            type TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            audio_url TEXT,
            audio_duration INTEGER,
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_messages_conversation_time
        ON messages(conversation_id, created_at, seq);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_user_notifications_unread
        ON user_notifications(user_id, is_read, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS seller_notifications (
            id TEXT PRIMARY KEY,
            seller_id TEXT NOT NULL,
            type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            is_read INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    info!("Migrations completed successfully");
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    client_id: String,
    creator_id: String,
    project_id: Option<String>,
    subject: String,
    last_message_at: i64,
    created_at: i64,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            client_id: row.client_id,
            creator_id: row.creator_id,
            project_id: row.project_id,
            subject: row.subject,
            last_message_at: to_datetime(row.last_message_at),
            created_at: to_datetime(row.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    sender_type: String,
    #[sqlx(rename = "type")]
    kind: String,
    content: String,
    audio_url: Option<String>,
    audio_duration: Option<i64>,
    is_read: bool,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            sender_type: row.sender_type.parse()?,
            kind: row.kind.parse()?,
            content: Some(row.content).filter(|c| !c.is_empty()),
            audio_url: row.audio_url,
            audio_duration: row.audio_duration.map(|d| d.clamp(0, u32::MAX as i64) as u32),
            is_read: row.is_read,
            created_at: to_datetime(row.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    owner_id: String,
    #[sqlx(rename = "type")]
    kind: String,
    title: String,
    message: String,
    data: String,
    is_read: bool,
    created_at: i64,
}

impl TryFrom<NotificationRow> for UserNotification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(UserNotification {
            id: row.id,
            user_id: row.owner_id,
            kind: row.kind.parse()?,
            title: row.title,
            message: row.message,
            data: serde_json::from_str(&row.data).unwrap_or_default(),
            is_read: row.is_read,
            created_at: to_datetime(row.created_at),
        })
    }
}

impl TryFrom<NotificationRow> for SellerNotification {
    type Error = anyhow::Error;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(SellerNotification {
            id: row.id,
            seller_id: row.owner_id,
            kind: row.kind.parse()?,
            title: row.title,
            message: row.message,
            data: serde_json::from_str(&row.data).unwrap_or_default(),
            is_read: row.is_read,
            created_at: to_datetime(row.created_at),
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_type, type, content, \
                               audio_url, audio_duration, is_read, created_at";

// ---------------------------------------------------------------------------
// Users, sellers, projects
// ---------------------------------------------------------------------------

/// Project fields the messaging core reads
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: String,
    pub client_id: String,
    pub name: String,
}

/// Seller profile fields the messaging core reads
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SellerRecord {
    pub id: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Store (or update) a user
pub async fn upsert_user(
    pool: &Pool<Sqlite>,
    id: &str,
    name: Option<&str>,
    image: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, image)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            name = COALESCE(excluded.name, users.name),
            image = COALESCE(excluded.image, users.image)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(image)
    .execute(pool)
    .await?;

    Ok(())
}

/// Store (or update) the seller profile of a user
pub async fn upsert_seller(
    pool: &Pool<Sqlite>,
    id: &str,
    user_id: &str,
    display_name: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sellers (id, user_id, display_name)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET
            display_name = COALESCE(excluded.display_name, sellers.display_name)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(display_name)
    .execute(pool)
    .await?;

    Ok(())
}

/// Store (or update) a project
pub async fn upsert_project(
    pool: &Pool<Sqlite>,
    id: &str,
    client_id: &str,
    name: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO projects (id, client_id, name)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(id)
    .bind(client_id)
    .bind(name)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_project(pool: &Pool<Sqlite>, project_id: &str) -> Result<Option<ProjectRecord>> {
    let row = sqlx::query_as::<_, ProjectRecord>(
        "SELECT id, client_id, name FROM projects WHERE id = ?1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_seller(pool: &Pool<Sqlite>, seller_id: &str) -> Result<Option<SellerRecord>> {
    let row = sqlx::query_as::<_, SellerRecord>(
        "SELECT id, user_id, display_name FROM sellers WHERE id = ?1",
    )
    .bind(seller_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub async fn get_seller_by_user(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Option<SellerRecord>> {
    let row = sqlx::query_as::<_, SellerRecord>(
        "SELECT id, user_id, display_name FROM sellers WHERE user_id = ?1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Display data for a user
pub async fn get_user_profile(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Option<ParticipantProfile>> {
    let row: Option<(String, Option<String>, Option<String>)> =
        sqlx::query_as("SELECT id, name, image FROM users WHERE id = ?1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(id, name, image)| ParticipantProfile {
        id,
        name: name.unwrap_or_else(|| "Client".to_string()),
        profile_image: image,
    }))
}

/// Display data for a seller, taken from the user behind it
pub async fn get_seller_profile(
    pool: &Pool<Sqlite>,
    seller_id: &str,
) -> Result<Option<ParticipantProfile>> {
    let row: Option<(String, Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
        r#"
        SELECT u.id, s.display_name, u.name, u.image
        FROM sellers s JOIN users u ON u.id = s.user_id
        WHERE s.id = ?1
        "#,
    )
    .bind(seller_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(id, display_name, name, image)| ParticipantProfile {
        id,
        name: display_name
            .or(name)
            .unwrap_or_else(|| "Créateur".to_string()),
        profile_image: image,
    }))
}

// ---------------------------------------------------------------------------
// Conversations
// ---------------------------------------------------------------------------

/// Find the conversation between a client and a creator for a project.
///
/// Rows carrying a project id match on it exactly. Rows without one are
/// matched when their subject contains `subject_hint`.
pub async fn find_conversation(
    pool: &Pool<Sqlite>,
    client_id: &str,
    creator_id: &str,
    project_id: &str,
    subject_hint: &str,
) -> Result<Option<Conversation>> {
    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, client_id, creator_id, project_id, subject, last_message_at, created_at
        FROM conversations
        WHERE client_id = ?1 AND creator_id = ?2
          AND (project_id = ?3
               OR (project_id IS NULL AND ?4 <> '' AND instr(subject, ?4) > 0))
        ORDER BY (project_id IS NULL) ASC, created_at ASC
        LIMIT 1
        "#,
    )
    .bind(client_id)
    .bind(creator_id)
    .bind(project_id)
    .bind(subject_hint)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Conversation::from))
}

pub async fn get_conversation(
    pool: &Pool<Sqlite>,
    conversation_id: &str,
) -> Result<Option<Conversation>> {
    let row = sqlx::query_as::<_, ConversationRow>(
        r#"
        SELECT id, client_id, creator_id, project_id, subject, last_message_at, created_at
        FROM conversations WHERE id = ?1
        "#,
    )
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Conversation::from))
}

/// Conversations one side participates in, newest activity first
pub async fn list_conversations(
    pool: &Pool<Sqlite>,
    side: SenderType,
    participant_id: &str,
) -> Result<Vec<Conversation>> {
    let sql = match side {
        SenderType::Creator => {
            r#"
            SELECT id, client_id, creator_id, project_id, subject, last_message_at, created_at
            FROM conversations WHERE creator_id = ?1
            ORDER BY last_message_at DESC
            "#
        }
        SenderType::Client => {
            r#"
            SELECT id, client_id, creator_id, project_id, subject, last_message_at, created_at
            FROM conversations WHERE client_id = ?1
            ORDER BY last_message_at DESC
            "#
        }
    };

    let rows = sqlx::query_as::<_, ConversationRow>(sql)
        .bind(participant_id)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(Conversation::from).collect())
}

async fn insert_conversation(
    conn: &mut SqliteConnection,
    client_id: &str,
    creator_id: &str,
    project_id: Option<&str>,
    subject: &str,
) -> std::result::Result<Conversation, sqlx::Error> {
    let now = now_millis();
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO conversations (id, client_id, creator_id, project_id, subject, last_message_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(&id)
    .bind(client_id)
    .bind(creator_id)
    .bind(project_id)
    .bind(subject)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Conversation {
        id,
        client_id: client_id.to_string(),
        creator_id: creator_id.to_string(),
        project_id: project_id.map(str::to_string),
        subject: subject.to_string(),
        last_message_at: to_datetime(now),
        created_at: to_datetime(now),
    })
}

/// Create a conversation together with its opening message, in one
/// transaction. Returns `None` when an equivalent conversation already exists;
/// in that case nothing is written.
pub async fn create_seeded_conversation(
    pool: &Pool<Sqlite>,
    client_id: &str,
    creator_id: &str,
    project_id: Option<&str>,
    subject: &str,
    greeting_sender: (&str, SenderType),
    greeting: &MessagePayload,
) -> Result<Option<(Conversation, Message)>> {
    let mut tx = pool.begin().await?;

    let mut conversation =
        match insert_conversation(&mut tx, client_id, creator_id, project_id, subject).await {
            Ok(c) => c,
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

    let (sender_id, sender_type) = greeting_sender;
    let message = insert_message(&mut tx, &conversation.id, sender_id, sender_type, greeting)
        .await?
        .ok_or_else(|| anyhow::anyhow!("conversation vanished inside its own transaction"))?;
    tx.commit().await?;

    conversation.last_message_at = message.created_at;
    Ok(Some((conversation, message)))
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Insert a message and stamp the conversation with its time.
///
/// `created_at` never goes below the conversation's current `last_message_at`
/// so persisted time order always agrees with insertion order.
async fn insert_message(
    conn: &mut SqliteConnection,
    conversation_id: &str,
    sender_id: &str,
    sender_type: SenderType,
    payload: &MessagePayload,
) -> Result<Option<Message>> {
    // Stamp first so the write lock is held before anything is read
    let stamped = sqlx::query(
        "UPDATE conversations SET last_message_at = MAX(last_message_at, ?1) WHERE id = ?2",
    )
    .bind(now_millis())
    .bind(conversation_id)
    .execute(&mut *conn)
    .await?;
    if stamped.rows_affected() == 0 {
        return Ok(None);
    }

    let created_at: i64 =
        sqlx::query_scalar("SELECT last_message_at FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_one(&mut *conn)
            .await?;
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, sender_id, sender_type, type, content, audio_url, audio_duration, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)
        "#,
    )
    .bind(&id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(sender_type.as_str())
    .bind(payload.kind.as_str())
    .bind(payload.content.as_deref().unwrap_or(""))
    .bind(payload.audio_url.as_deref())
    .bind(payload.audio_duration.map(i64::from))
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(Some(Message {
        id,
        conversation_id: conversation_id.to_string(),
        sender_id: sender_id.to_string(),
        sender_type,
        content: payload.content.clone().filter(|c| !c.is_empty()),
        audio_url: payload.audio_url.clone(),
        audio_duration: payload.audio_duration,
        kind: payload.kind,
        is_read: false,
        created_at: to_datetime(created_at),
    }))
}

/// Append a message to a conversation. Returns `None` if the conversation
/// does not exist.
pub async fn append_message(
    pool: &Pool<Sqlite>,
    conversation_id: &str,
    sender_id: &str,
    sender_type: SenderType,
    payload: &MessagePayload,
) -> Result<Option<Message>> {
    let mut tx = pool.begin().await?;
    let message = insert_message(&mut tx, conversation_id, sender_id, sender_type, payload).await?;
    if message.is_some() {
        tx.commit().await?;
    } else {
        tx.rollback().await?;
    }
    Ok(message)
}

/// Full message history of a conversation, oldest first
pub async fn list_messages(pool: &Pool<Sqlite>, conversation_id: &str) -> Result<Vec<Message>> {
    let rows = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at ASC, seq ASC",
        MESSAGE_COLUMNS
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Message::try_from).collect()
}

pub async fn get_message(pool: &Pool<Sqlite>, message_id: &str) -> Result<Option<Message>> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {} FROM messages WHERE id = ?1",
        MESSAGE_COLUMNS
    ))
    .bind(message_id)
    .fetch_optional(pool)
    .await?;

    row.map(Message::try_from).transpose()
}

pub async fn last_message(pool: &Pool<Sqlite>, conversation_id: &str) -> Result<Option<Message>> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {} FROM messages WHERE conversation_id = ?1 ORDER BY created_at DESC, seq DESC LIMIT 1",
        MESSAGE_COLUMNS
    ))
    .bind(conversation_id)
    .fetch_optional(pool)
    .await?;

    row.map(Message::try_from).transpose()
}

/// Flip a message's read flag. Returns true only for the false→true transition.
pub async fn mark_message_read(pool: &Pool<Sqlite>, message_id: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE messages SET is_read = 1 WHERE id = ?1 AND is_read = 0")
        .bind(message_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Unread messages in a conversation, excluding those written by `excluding`
pub async fn count_unread(
    pool: &Pool<Sqlite>,
    conversation_id: &str,
    excluding: SenderType,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM messages
        WHERE conversation_id = ?1 AND is_read = 0 AND sender_type <> ?2
        "#,
    )
    .bind(conversation_id)
    .bind(excluding.as_str())
    .fetch_one(pool)
    .await?;

    Ok(count)
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub async fn insert_user_notification(
    pool: &Pool<Sqlite>,
    user_id: &str,
    kind: NotificationType,
    title: &str,
    message: &str,
    data: &serde_json::Value,
) -> Result<UserNotification> {
    let id = Uuid::new_v4().to_string();
    let now = now_millis();

    sqlx::query(
        r#"
        INSERT INTO user_notifications (id, user_id, type, title, message, data, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(message)
    .bind(data.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(UserNotification {
        id,
        user_id: user_id.to_string(),
        kind,
        title: title.to_string(),
        message: message.to_string(),
        data: data.clone(),
        is_read: false,
        created_at: to_datetime(now),
    })
}

/// Unread notifications of a user, newest first
pub async fn get_unread_notifications(
    pool: &Pool<Sqlite>,
    user_id: &str,
) -> Result<Vec<UserNotification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, user_id AS owner_id, type, title, message, data, is_read, created_at
        FROM user_notifications
        WHERE user_id = ?1 AND is_read = 0
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(UserNotification::try_from).collect()
}

/// Mark one notification of `user_id` as read. Returns false if the user has
/// no such notification; marking an already-read one succeeds.
pub async fn mark_notification_read(
    pool: &Pool<Sqlite>,
    notification_id: &str,
    user_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE user_notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
    )
    .bind(notification_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn mark_all_notifications_read(pool: &Pool<Sqlite>, user_id: &str) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE user_notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn insert_seller_notification(
    pool: &Pool<Sqlite>,
    seller_id: &str,
    kind: NotificationType,
    title: &str,
    message: &str,
    data: &serde_json::Value,
) -> Result<SellerNotification> {
    let id = Uuid::new_v4().to_string();
    let now = now_millis();

    sqlx::query(
        r#"
        INSERT INTO seller_notifications (id, seller_id, type, title, message, data, is_read, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
        "#,
    )
    .bind(&id)
    .bind(seller_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(message)
    .bind(data.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(SellerNotification {
        id,
        seller_id: seller_id.to_string(),
        kind,
        title: title.to_string(),
        message: message.to_string(),
        data: data.clone(),
        is_read: false,
        created_at: to_datetime(now),
    })
}

pub async fn get_unread_seller_notifications(
    pool: &Pool<Sqlite>,
    seller_id: &str,
) -> Result<Vec<SellerNotification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, seller_id AS owner_id, type, title, message, data, is_read, created_at
        FROM seller_notifications
        WHERE seller_id = ?1 AND is_read = 0
        ORDER BY created_at DESC
        "#,
    )
    .bind(seller_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SellerNotification::try_from).collect()
}

// ---------------------------------------------------------------------------
// Quote offers
// ---------------------------------------------------------------------------

/// Minimal quote offer record, enough to fire quote events
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct QuoteRecord {
    pub id: String,
    pub project_id: String,
    pub seller_id: String,
    pub price: f64,
    pub currency: String,
    pub delivery_days: i64,
    pub description: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields of a quote offer as submitted
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuote<'a> {
    pub project_id: &'a str,
    pub seller_id: &'a str,
    pub price: f64,
    pub currency: &'a str,
    pub delivery_days: i64,
    pub description: &'a str,
}

pub async fn insert_quote_offer(pool: &Pool<Sqlite>, quote: &NewQuote<'_>) -> Result<QuoteRecord> {
    let id = Uuid::new_v4().to_string();
    let now = now_millis();

    sqlx::query(
        r#"
        INSERT INTO quote_offers (id, project_id, seller_id, price, currency, delivery_days, description, status, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?8)
        "#,
    )
    .bind(&id)
    .bind(quote.project_id)
    .bind(quote.seller_id)
    .bind(quote.price)
    .bind(quote.currency)
    .bind(quote.delivery_days)
    .bind(quote.description)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(QuoteRecord {
        id,
        project_id: quote.project_id.to_string(),
        seller_id: quote.seller_id.to_string(),
        price: quote.price,
        currency: quote.currency.to_string(),
        delivery_days: quote.delivery_days,
        description: quote.description.to_string(),
        status: "pending".to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_quote_offer(pool: &Pool<Sqlite>, quote_id: &str) -> Result<Option<QuoteRecord>> {
    let row = sqlx::query_as::<_, QuoteRecord>(
        r#"
        SELECT id, project_id, seller_id, price, currency, delivery_days, description, status, created_at, updated_at
        FROM quote_offers WHERE id = ?1
        "#,
    )
    .bind(quote_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Overwrite the commercial terms of a quote; absent fields keep their value
pub async fn update_quote_offer(
    pool: &Pool<Sqlite>,
    quote_id: &str,
    price: Option<f64>,
    delivery_days: Option<i64>,
    description: Option<&str>,
) -> Result<Option<QuoteRecord>> {
    sqlx::query(
        r#"
        UPDATE quote_offers SET
            price = COALESCE(?2, price),
            delivery_days = COALESCE(?3, delivery_days),
            description = COALESCE(?4, description),
            updated_at = ?5
        WHERE id = ?1
        "#,
    )
    .bind(quote_id)
    .bind(price)
    .bind(delivery_days)
    .bind(description)
    .bind(now_millis())
    .execute(pool)
    .await?;

    get_quote_offer(pool, quote_id).await
}

pub async fn set_quote_status(pool: &Pool<Sqlite>, quote_id: &str, status: &str) -> Result<()> {
    sqlx::query("UPDATE quote_offers SET status = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(quote_id)
        .bind(status)
        .bind(now_millis())
        .execute(pool)
        .await?;

    Ok(())
}
