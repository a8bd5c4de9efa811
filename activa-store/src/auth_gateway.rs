use activa_core::identity::{AuthGateway, AuthUser, Credentials, Session};
use activa_core::{CoreError, CoreResult};
use activa_shared::Masked;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::app_config::AuthConfig;

const TOKEN_AUDIENCE: &str = "authenticated";

/// Access-token claims issued by the provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderClaims {
    pub sub: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
    email: Option<String>,
}

impl From<ProviderUser> for AuthUser {
    fn from(user: ProviderUser) -> Self {
        AuthUser { id: user.id, email: user.email }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: ProviderUser,
}

/// Client for a Supabase (GoTrue) auth endpoint.
///
/// Identity stays with the provider: sign-up and sign-in are forwarded, and
/// bearer tokens are either checked against the project JWT secret or sent
/// back to the provider for verification.
#[derive(Clone)]
pub struct SupabaseAuthGateway {
    base_url: String,
    anon_key: Masked<String>,
    jwt_secret: Option<Masked<String>>,
    http: Client,
}

impl SupabaseAuthGateway {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            base_url: cfg.provider_url.trim_end_matches('/').to_string(),
            anon_key: Masked(cfg.anon_key.clone()),
            jwt_secret: cfg.jwt_secret.clone().filter(|s| !s.is_empty()).map(Masked),
            http: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn verify_locally(&self, token: &str, secret: &str) -> CoreResult<AuthUser> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);

        let data = decode::<ProviderClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!("Token rejected: {}", e);
            invalid_token()
        })?;

        let id = Uuid::parse_str(&data.claims.sub).map_err(|_| invalid_token())?;
        Ok(AuthUser { id, email: data.claims.email })
    }

    /// Every failure is `AuthError`; outages are logged, not surfaced.
    async fn verify_remotely(&self, token: &str) -> CoreResult<AuthUser> {
        let resp = self
            .http
            .get(self.url("user"))
            .header("apikey", self.anon_key.expose())
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                error!("Token verification request failed: {}", e);
                invalid_token()
            })?;

        match resp.status() {
            s if s.is_success() => {
                let user: ProviderUser = resp.json().await.map_err(|e| {
                    error!("Unreadable user from auth provider: {}", e);
                    invalid_token()
                })?;
                Ok(user.into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => Err(invalid_token()),
            s => {
                error!("Auth provider returned {} while verifying a token", s);
                Err(invalid_token())
            }
        }
    }
}

fn invalid_token() -> CoreError {
    CoreError::AuthError("Invalid token".to_string())
}

fn transport_error(err: reqwest::Error) -> CoreError {
    error!("Auth provider request failed: {}", err);
    CoreError::internal(err)
}

/// Sign-up returns the user either bare or inside a session, depending on
/// whether the project requires email confirmation.
fn extract_user(body: &Value) -> Option<AuthUser> {
    let user = body.get("user").filter(|u| !u.is_null()).unwrap_or(body);
    let id = user.get("id")?.as_str().and_then(|s| Uuid::parse_str(s).ok())?;
    let email = user.get("email").and_then(Value::as_str).map(str::to_string);
    Some(AuthUser { id, email })
}

fn provider_message(body: &Value, fallback: &str) -> String {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .unwrap_or(fallback)
        .to_string()
}

#[async_trait]
impl AuthGateway for SupabaseAuthGateway {
    async fn sign_up(&self, credentials: &Credentials) -> CoreResult<AuthUser> {
        let resp = self
            .http
            .post(self.url("signup"))
            .header("apikey", self.anon_key.expose())
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            extract_user(&body).ok_or_else(|| CoreError::validation("User creation failed"))
        } else if status.is_client_error() {
            Err(CoreError::validation(provider_message(&body, "User creation failed")))
        } else {
            Err(CoreError::internal(format!("auth provider returned {}", status)))
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> CoreResult<Session> {
        let resp = self
            .http
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", self.anon_key.expose())
            .json(&json!({
                "email": credentials.email,
                "password": credentials.password,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status.is_success() {
            let token: TokenResponse = resp.json().await.map_err(transport_error)?;
            return Ok(Session {
                user: token.user.into(),
                access_token: Masked(token.access_token),
            });
        }

        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status.is_client_error() {
            Err(CoreError::AuthError(provider_message(&body, "Login failed")))
        } else {
            Err(CoreError::internal(format!("auth provider returned {}", status)))
        }
    }

    async fn verify_token(&self, token: &str) -> CoreResult<AuthUser> {
        match &self.jwt_secret {
            Some(secret) => self.verify_locally(token, secret.expose()),
            None => self.verify_remotely(token).await,
        }
    }
}
