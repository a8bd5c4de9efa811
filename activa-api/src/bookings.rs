use activa_core::models::BookingWithActivity;
use activa_core::{AuthUser, CreateBookingRequest};
use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, middleware::require_user, state::AppState};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct BookingCreatedResponse {
    message: &'static str,
    booking: BookingWithActivity,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BookingCancelledResponse {
    message: &'static str,
    booking_id: Uuid,
}

#[derive(Debug, Serialize)]
struct MyBookingsResponse {
    bookings: Vec<BookingWithActivity>,
}

/// All routes here require a verified bearer token.
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/book", post(create_booking))
        .route("/cancel-booking", delete(cancel_booking))
        .route("/my-bookings", get(my_bookings))
        .route_layer(middleware::from_fn_with_state(state, require_user))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /book
async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingCreatedResponse>), AppError> {
    let Json(req) = payload?;

    let booking = state
        .engine
        .create_booking(user.id, &req)
        .await
        .inspect_err(|e| state.metrics.record_rejection(e))?;
    state.metrics.bookings_created.inc();

    Ok((
        StatusCode::CREATED,
        Json(BookingCreatedResponse {
            message: "Booking created successfully",
            booking,
        }),
    ))
}

/// DELETE /cancel-booking?id=
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    params: Result<Query<CancelParams>, QueryRejection>,
) -> Result<Json<BookingCancelledResponse>, AppError> {
    let Query(params) = params?;
    let raw_id = params.id.unwrap_or_default();

    let booking_id = state
        .engine
        .cancel_booking(user.id, &raw_id)
        .await
        .inspect_err(|e| state.metrics.record_rejection(e))?;
    state.metrics.bookings_cancelled.inc();

    Ok(Json(BookingCancelledResponse {
        message: "Booking cancelled successfully",
        booking_id,
    }))
}

/// GET /my-bookings
/// Newest booking first, each joined with its activity
async fn my_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MyBookingsResponse>, AppError> {
    let bookings = state.engine.list_my_bookings(user.id).await?;
    Ok(Json(MyBookingsResponse { bookings }))
}
