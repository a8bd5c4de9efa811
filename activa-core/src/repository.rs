use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{Activity, Booking, BookingWithActivity, NewBooking, SlotCorrection};
use crate::search::ActivityQuery;

pub type RepoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Result of the combined "take a slot and insert the booking" write.
#[derive(Debug, Clone, PartialEq)]
pub enum ReservationOutcome {
    Reserved(BookingWithActivity),
    /// The conditional decrement matched no row.
    SoldOut,
    /// The (user, activity, date) triple is already booked.
    Duplicate,
    ActivityMissing,
}

/// Result of the combined "delete the booking and return its slot" write.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseOutcome {
    Released { activity_id: Uuid },
    /// The booking was gone (or not owned by the caller) by the time the delete ran.
    Missing,
}

/// Repository trait for activity data access
#[async_trait]
pub trait ActivityRepository: Send + Sync {
    /// Returns one page of listable activities and the total number of matches.
    async fn list_activities(
        &self,
        query: &ActivityQuery,
    ) -> RepoResult<(Vec<Activity>, i64)>;

    async fn get_activity(
        &self,
        id: Uuid,
    ) -> RepoResult<Option<Activity>>;

    async fn count_activities(&self) -> RepoResult<i64>;

    /// Resets every drifted counter to `total_slots - bookings` and reports what changed.
    async fn reconcile_slots(&self) -> RepoResult<Vec<SlotCorrection>>;
}

/// Repository trait for booking data access
///
/// `reserve_slot` and `release_slot` are the only writers of `available_slots`:
/// each must apply its counter update and its booking row change atomically.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn find_owned_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<Booking>>;

    async fn booking_exists(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        booking_date: NaiveDate,
    ) -> RepoResult<bool>;

    async fn reserve_slot(
        &self,
        booking: &NewBooking,
    ) -> RepoResult<ReservationOutcome>;

    async fn release_slot(
        &self,
        booking: &Booking,
    ) -> RepoResult<ReleaseOutcome>;

    /// Newest first.
    async fn list_user_bookings(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Vec<BookingWithActivity>>;
}
