use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Reports 503 when the activity store cannot be reached.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.catalog.count_activities().await {
        Ok(activities) => (StatusCode::OK, Json(json!({ "status": "ok", "activities": activities }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
        }
    }
}
