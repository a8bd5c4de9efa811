use activa_core::models::Activity;
use activa_core::search::{ActivityPage, ActivityQuery, ListingParams};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct ActivityResponse {
    activity: Activity,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/activities", get(list_activities))
        .route("/activities/{id}", get(get_activity))
}

/// GET /activities
/// Listable activities (at least one slot left), filtered, sorted and paged
async fn list_activities(
    State(state): State<AppState>,
    params: Result<Query<ListingParams>, QueryRejection>,
) -> Result<Json<ActivityPage>, AppError> {
    let Query(params) = params?;
    let query = ActivityQuery::from_params(params, state.listing)?;
    let page = state.catalog.list_activities(&query).await?;

    tracing::debug!(
        "Listed {} of {} activities (page {})",
        page.activities.len(),
        page.pagination.total,
        page.pagination.page
    );
    Ok(Json(page))
}

/// GET /activities/{id}
async fn get_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActivityResponse>, AppError> {
    let activity = state.catalog.get_activity(&id).await?;
    Ok(Json(ActivityResponse { activity }))
}
