use std::sync::Arc;
use activa_core::repository::{ActivityRepository, BookingRepository};
use activa_core::search::ListingLimits;
use activa_core::{ActivityService, AuthGateway, BookingEngine, Clock, RateLimiter};
use activa_store::app_config::RateLimitConfig;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    pub catalog: Arc<ActivityService>,
    pub auth: Arc<dyn AuthGateway>,
    pub metrics: Arc<Metrics>,
    pub listing: ListingLimits,
    /// Rate limiting is active only when a limiter is configured.
    pub rate_limiter: Option<Arc<dyn RateLimiter>>,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        bookings: Arc<dyn BookingRepository>,
        auth: Arc<dyn AuthGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            engine: Arc::new(BookingEngine::new(activities.clone(), bookings, clock)),
            catalog: Arc::new(ActivityService::new(activities)),
            auth,
            metrics: Arc::new(Metrics::new()?),
            listing: ListingLimits::default(),
            rate_limiter: None,
            rate_limit: RateLimitConfig::default(),
        })
    }

    pub fn with_listing(mut self, listing: ListingLimits) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_rate_limit(mut self, limiter: Arc<dyn RateLimiter>, rate_limit: RateLimitConfig) -> Self {
        self.rate_limiter = Some(limiter);
        self.rate_limit = rate_limit;
        self
    }
}
