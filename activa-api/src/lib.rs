use activa_core::rate_limit::within_limit;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::{from_fn_with_state, Next},
    response::Response,
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod activities;
pub mod auth;
pub mod bookings;
pub mod error;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod worker;

pub use error::AppError;
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let mut router = Router::new()
        .merge(activities::routes())
        .merge(bookings::routes(state.clone()))
        .merge(auth::routes())
        .merge(health::routes())
        .merge(metrics::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    if state.rate_limiter.is_some() {
        router = router.layer(from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    router.with_state(state)
}

/// Fixed-window limit per client IP. Limiter failures let the request through.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(limiter) = state.rate_limiter.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match within_limit(limiter, &key, state.rate_limit.requests, state.rate_limit.window_seconds).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err(AppError::RateLimited),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, allowing request: {}", e);
            Ok(next.run(req).await)
        }
    }
}
