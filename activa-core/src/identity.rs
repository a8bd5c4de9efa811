use activa_shared::Masked;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// A caller identity as reported by the external auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: Masked<String>,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Masked<String>,
}

impl Credentials {
    pub fn from_parts(email: Option<String>, password: Option<Masked<String>>) -> CoreResult<Self> {
        let email = email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty());
        let password = password.filter(|p| !p.expose().is_empty());
        match (email, password) {
            (Some(email), Some(password)) => Ok(Self { email, password }),
            _ => Err(CoreError::validation("Email and password are required")),
        }
    }
}

/// The external identity provider. Users live there; this service keeps no user table.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Provider-side rejections are `ValidationError`.
    async fn sign_up(&self, credentials: &Credentials) -> CoreResult<AuthUser>;

    /// Bad credentials are `AuthError`.
    async fn sign_in(&self, credentials: &Credentials) -> CoreResult<Session>;

    /// Any failure to verify is `AuthError`.
    async fn verify_token(&self, token: &str) -> CoreResult<AuthUser>;
}
