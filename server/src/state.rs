//! Server state shared across requests and connections

use anyhow::Result;
use dashmap::DashMap;
use miramatch_shared::Role;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth::{AuthManager, Identity};
use crate::config::ServerConfig;
use crate::db::MessageStore;
use crate::error::{AppError, AppResult};
use crate::messaging::MessagingService;
use crate::notifications::push::{HttpPushGateway, PushGateway, PushQueue};
use crate::notifications::NotificationDispatcher;
use crate::resolver::ConversationResolver;
use crate::rooms::{ConnectionId, Rooms};

pub struct ServerState {
    pub config: ServerConfig,
    pub store: Arc<dyn MessageStore>,
    pub auth: AuthManager,
    pub rooms: Arc<Rooms>,
    pub resolver: ConversationResolver,
    pub notifications: Arc<NotificationDispatcher>,
    pub messaging: MessagingService,
    /// Live connections → participant id
    pub connections: DashMap<ConnectionId, String>,
    next_connection_id: AtomicU64,
    /// Current total connection count (for enforcing max_connections)
    connection_count: AtomicUsize,
    /// Per-IP connection counts (for enforcing max_connections_per_ip)
    ip_connections: DashMap<IpAddr, AtomicUsize>,
    push_worker: Mutex<Option<JoinHandle<()>>>,
}

impl ServerState {
    /// Build the state, starting the push worker when a push API is configured
    pub fn new(store: Arc<dyn MessageStore>, config: ServerConfig) -> Result<Self> {
        let gateway: Option<Arc<dyn PushGateway>> = match config.push_api_url.as_deref() {
            Some(url) => {
                info!("Push delivery enabled via {}", url);
                Some(Arc::new(HttpPushGateway::new(
                    url,
                    Duration::from_secs(config.push_timeout_seconds),
                )?))
            }
            None => {
                warn!("MM_PUSH_API_URL not set, external push disabled");
                None
            }
        };
        Ok(Self::with_push_gateway(store, config, gateway))
    }

    /// Build the state around an explicit push gateway (or none)
    pub fn with_push_gateway(
        store: Arc<dyn MessageStore>,
        config: ServerConfig,
        gateway: Option<Arc<dyn PushGateway>>,
    ) -> Self {
        let (queue, worker) = match gateway {
            Some(gateway) => {
                let (queue, worker) = PushQueue::start(gateway, config.push_queue_capacity);
                (Some(queue), Some(worker))
            }
            None => (None, None),
        };

        let rooms = Arc::new(Rooms::new());
        let notifications = Arc::new(NotificationDispatcher::new(store.clone(), queue));
        let messaging = MessagingService::new(
            store.clone(),
            rooms.clone(),
            notifications.clone(),
            config.max_message_size,
        );

        Self {
            auth: AuthManager::new(&config.jwt_secret),
            resolver: ConversationResolver::new(store.clone()),
            config,
            store,
            rooms,
            notifications,
            messaging,
            connections: DashMap::new(),
            next_connection_id: AtomicU64::new(1),
            connection_count: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
            push_worker: Mutex::new(worker),
        }
    }

    /// Verify a bearer token and resolve the caller's conversation identity
    pub async fn identify(&self, token: &str) -> AppResult<Identity> {
        let claims = self.auth.verify(token)?;
        let role: Role = claims.role.parse().map_err(|_| {
            warn!("Token carries unsupported role {}", claims.role);
            AppError::Unauthorized
        })?;

        let participant_id = match role {
            Role::Client => claims.sub.clone(),
            Role::Creator => {
                self.store
                    .get_seller_by_user(&claims.sub)
                    .await?
                    .ok_or(AppError::NotFound("Creator profile"))?
                    .id
            }
        };

        Ok(Identity {
            user_id: claims.sub,
            role,
            participant_id,
        })
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Try to acquire a connection slot. Returns false if limits are exceeded.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> bool {
        let max_global = self.config.max_connections;
        let max_per_ip = self.config.max_connections_per_ip;

        // Check global limit (0 = unlimited)
        if max_global > 0 && self.connection_count.load(Ordering::Relaxed) >= max_global {
            return false;
        }

        // Check per-IP limit (0 = unlimited)
        if max_per_ip > 0 {
            let entry = self.ip_connections.entry(ip).or_insert_with(|| AtomicUsize::new(0));
            if entry.value().load(Ordering::Relaxed) >= max_per_ip {
                return false;
            }
            entry.value().fetch_add(1, Ordering::Relaxed);
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Release a connection slot
    pub fn release_connection(&self, ip: IpAddr) {
        self.connection_count.fetch_sub(1, Ordering::Relaxed);
        if let Some(entry) = self.ip_connections.get(&ip) {
            let prev = entry.value().fetch_sub(1, Ordering::Relaxed);
            if prev <= 1 {
                drop(entry);
                self.ip_connections.remove(&ip);
            }
        }
    }

    /// Close the push queue and wait for queued pushes to finish
    pub async fn shutdown(&self) {
        self.notifications.close_push();
        if let Some(worker) = self.push_worker.lock().await.take() {
            if let Err(e) = worker.await {
                warn!("Push worker ended abnormally: {}", e);
            }
        }
    }
}
