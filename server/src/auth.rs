//! Bearer credential verification
//!
//! Tokens are issued elsewhere; this module only checks signature and expiry
//! and turns the claims into an [`Identity`]. The same check guards REST
//! requests and the websocket handshake.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use miramatch_shared::{Role, SenderType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppError;
use crate::state::ServerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// CLIENT, CREATOR or SELLER
    pub role: String,
    pub exp: i64,
}

/// Verifies HS256 bearer tokens
pub struct AuthManager {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthManager {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Check signature and expiry. Any failure is `Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AppError::Unauthorized
            })
    }
}

/// An authenticated caller
///
/// `participant_id` is the id the caller appears under inside conversations:
/// the seller id for creators, the user id for clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    pub participant_id: String,
}

impl Identity {
    pub fn sender_type(&self) -> SenderType {
        self.role.sender_type()
    }

    pub fn require_creator(&self) -> Result<(), AppError> {
        match self.role {
            Role::Creator => Ok(()),
            Role::Client => Err(AppError::Forbidden("Creators only".into())),
        }
    }

    pub fn require_client(&self) -> Result<(), AppError> {
        match self.role {
            Role::Client => Ok(()),
            Role::Creator => Err(AppError::Forbidden("Clients only".into())),
        }
    }
}

/// Pull the bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extractor that rejects the request unless it carries a valid credential
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<ServerState>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let identity = state.identify(token).await?;
        Ok(AuthenticatedUser(identity))
    }
}
