use activa_core::{AuthUser, Credentials};
use activa_shared::Masked;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    email: Option<String>,
    password: Option<Masked<String>>,
}

#[derive(Debug, Serialize)]
struct SignupResponse {
    message: &'static str,
    user: AuthUser,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    message: &'static str,
    user: AuthUser,
    token: Masked<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

fn credentials(payload: Result<Json<CredentialsRequest>, JsonRejection>) -> Result<Credentials, AppError> {
    let Json(req) = payload?;
    Ok(Credentials::from_parts(req.email, req.password)?)
}

/// POST /signup
async fn signup(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let credentials = credentials(payload)?;
    let user = state.auth.sign_up(&credentials).await?;
    tracing::info!("User {} signed up", user.id);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

/// POST /login
/// Returns the provider's access token for use as a bearer token
async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let credentials = credentials(payload)?;
    let session = state.auth.sign_in(&credentials).await?;
    tracing::debug!("User {} logged in", session.user.id);

    Ok(Json(LoginResponse {
        message: "Login successful",
        user: session.user,
        token: session.access_token,
    }))
}
