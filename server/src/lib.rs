//! MiraMatch messaging server
//!
//! Persists conversations and messages, resolves one conversation per
//! (client, creator, project), fans realtime events out to conversation rooms
//! over websockets, and records notifications for quote and message events.

pub mod auth;
pub mod config;
pub mod database;
pub mod db;
pub mod error;
pub mod messaging;
pub mod notifications;
pub mod quotes;
pub mod resolver;
pub mod rooms;
pub mod routing;
pub mod state;
pub mod websocket;

pub use config::ServerConfig;
pub use error::{AppError, AppResult};
pub use state::ServerState;
