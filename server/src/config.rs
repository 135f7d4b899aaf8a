//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// HS256 secret used to verify bearer credentials
    pub jwt_secret: String,
    /// Base URL of the external push API (None = push disabled)
    pub push_api_url: Option<String>,
    /// Push HTTP timeout in seconds
    pub push_timeout_seconds: u64,
    /// Capacity of the push queue; jobs beyond it are dropped with a warning
    pub push_queue_capacity: usize,
    /// Maximum text message size in bytes
    pub max_message_size: usize,
    /// WebSocket ping interval in seconds
    pub ws_ping_interval: u64,
    /// Maximum total WebSocket connections (0 = unlimited)
    pub max_connections: usize,
    /// Maximum WebSocket connections per IP address (0 = unlimited)
    pub max_connections_per_ip: usize,
    /// Comma-separated list of allowed CORS origins (empty = permissive)
    pub cors_origins: Option<String>,
    /// Bearer token for /admin/* endpoints (None = endpoints hidden)
    pub admin_token: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = ServerConfig {
            host: env::var("MM_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("MM_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("Invalid MM_PORT")?,
            database_url: env::var("MM_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://./data/miramatch.db".to_string()),
            jwt_secret: env::var("MM_JWT_SECRET").context("MM_JWT_SECRET must be set")?,
            push_api_url: env::var("MM_PUSH_API_URL").ok().filter(|s| !s.is_empty()),
            push_timeout_seconds: env::var("MM_PUSH_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .context("Invalid MM_PUSH_TIMEOUT")?,
            push_queue_capacity: env::var("MM_PUSH_QUEUE_CAPACITY")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .context("Invalid MM_PUSH_QUEUE_CAPACITY")?,
            max_message_size: env::var("MM_MAX_MESSAGE_SIZE")
                .unwrap_or_else(|_| "65536".to_string()) // 64KB
                .parse()
                .context("Invalid MM_MAX_MESSAGE_SIZE")?,
            ws_ping_interval: env::var("MM_WS_PING_INTERVAL")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid MM_WS_PING_INTERVAL")?,
            max_connections: env::var("MM_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .context("Invalid MM_MAX_CONNECTIONS")?,
            max_connections_per_ip: env::var("MM_MAX_CONNECTIONS_PER_IP")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid MM_MAX_CONNECTIONS_PER_IP")?,
            cors_origins: env::var("MM_CORS_ORIGINS").ok(),
            admin_token: env::var("MM_ADMIN_TOKEN").ok(),
        };

        if config.jwt_secret.trim().is_empty() {
            anyhow::bail!("MM_JWT_SECRET must not be empty");
        }

        Ok(config)
    }

    /// Defaults suitable for tests and local runs, with push disabled
    pub fn local(jwt_secret: &str) -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: jwt_secret.to_string(),
            push_api_url: None,
            push_timeout_seconds: 5,
            push_queue_capacity: 256,
            max_message_size: 65536,
            ws_ping_interval: 30,
            max_connections: 0,
            max_connections_per_ip: 0,
            cors_origins: None,
            admin_token: None,
        }
    }
}
