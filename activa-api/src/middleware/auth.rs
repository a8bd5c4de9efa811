use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};

use crate::{error::AppError, state::AppState};

// ============================================================================
// Bearer Authentication Middleware
// ============================================================================

/// Verifies the bearer token with the auth provider and injects the caller's
/// `AuthUser` into request extensions. Runs before any body is read, so an
/// unauthenticated request never reaches business validation.
pub async fn require_user(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract token from Authorization header
    let TypedHeader(Authorization(bearer)) = bearer
        .map_err(|_| AppError::AuthenticationError("Authorization token required".to_string()))?;

    // 2. Ask the provider who this is
    let user = state.auth.verify_token(bearer.token()).await.map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        AppError::AuthenticationError("Invalid token".to_string())
    })?;

    // 3. Inject identity into request extensions
    tracing::debug!("Authenticated user {}", user.id);
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
