pub mod booking;
pub mod catalog;
pub mod clock;
pub mod identity;
pub mod memory;
pub mod models;
pub mod rate_limit;
pub mod repository;
pub mod search;

pub use booking::{BookingEngine, CreateBookingRequest};
pub use catalog::ActivityService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use identity::{AuthGateway, AuthUser, Credentials, Session};
pub use rate_limit::RateLimiter;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    AuthError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConflictError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFoundError(msg.into())
    }

    /// Wraps an unexpected store or provider failure.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::InternalError(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
