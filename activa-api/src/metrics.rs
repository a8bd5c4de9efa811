use activa_core::booking::{DUPLICATE_BOOKING, NO_SLOTS, PAST_CANCELLATION};
use activa_core::CoreError;
use axum::{extract::State, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

pub struct Metrics {
    registry: Registry,
    pub bookings_created: IntCounter,
    pub bookings_cancelled: IntCounter,
    pub booking_rejections: IntCounterVec,
    pub slot_corrections: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bookings_created = IntCounter::new("activa_bookings_created_total", "Bookings created")?;
        let bookings_cancelled = IntCounter::new("activa_bookings_cancelled_total", "Bookings cancelled")?;
        let booking_rejections = IntCounterVec::new(
            Opts::new("activa_booking_rejections_total", "Booking or cancellation requests refused"),
            &["reason"],
        )?;
        let slot_corrections = IntCounter::new(
            "activa_slot_corrections_total",
            "Slot counters repaired by reconciliation",
        )?;

        registry.register(Box::new(bookings_created.clone()))?;
        registry.register(Box::new(bookings_cancelled.clone()))?;
        registry.register(Box::new(booking_rejections.clone()))?;
        registry.register(Box::new(slot_corrections.clone()))?;

        Ok(Self {
            registry,
            bookings_created,
            bookings_cancelled,
            booking_rejections,
            slot_corrections,
        })
    }

    pub fn record_rejection(&self, err: &CoreError) {
        let reason = match err {
            CoreError::ConflictError(msg) if msg == NO_SLOTS => "sold_out",
            CoreError::ConflictError(msg) if msg == DUPLICATE_BOOKING => "duplicate",
            CoreError::ConflictError(msg) if msg == PAST_CANCELLATION => "past_booking",
            CoreError::ConflictError(_) => "conflict",
            CoreError::ValidationError(_) => "validation",
            CoreError::NotFoundError(_) => "not_found",
            CoreError::AuthError(_) => "auth",
            CoreError::InternalError(_) => "internal",
        };
        self.booking_rejections.with_label_values(&[reason]).inc();
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(metrics))
}

async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(format!("metrics encoding failed: {}", e)))
}
