use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::models::{parse_id, BookingWithActivity, NewBooking};
use crate::repository::{ActivityRepository, BookingRepository, ReleaseOutcome, ReservationOutcome};
use crate::{CoreError, CoreResult};

pub const NO_SLOTS: &str = "no slots available";
pub const DUPLICATE_BOOKING: &str = "duplicate booking";
pub const PAST_CANCELLATION: &str = "cannot cancel past booking";
pub const PAST_DATE: &str = "date must be in the future";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub activity_id: Option<String>,
    pub booking_date: Option<String>,
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp, keeping only its date.
pub fn parse_booking_date(raw: &str) -> CoreResult<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.date_naive()))
        .map_err(|_| CoreError::validation("invalid booking date"))
}

/// Creates, cancels and lists bookings against the finite slot pool of each activity.
pub struct BookingEngine {
    activities: Arc<dyn ActivityRepository>,
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
}

impl BookingEngine {
    pub fn new(
        activities: Arc<dyn ActivityRepository>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { activities, bookings, clock }
    }

    pub async fn create_booking(
        &self,
        user_id: Uuid,
        req: &CreateBookingRequest,
    ) -> CoreResult<BookingWithActivity> {
        // 1. Presence
        let raw_activity = req
            .activity_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CoreError::validation("Activity ID is required"))?;
        let raw_date = req
            .booking_date
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CoreError::validation("Booking date is required"))?;
        let activity_id = parse_id(raw_activity, "activity")?;

        // 2. Date is today or later
        let booking_date = parse_booking_date(raw_date)?;
        if booking_date < self.clock.today() {
            return Err(CoreError::validation(PAST_DATE));
        }

        // 3. Activity exists
        let activity = self
            .activities
            .get_activity(activity_id)
            .await
            .map_err(CoreError::internal)?
            .ok_or_else(|| CoreError::not_found("Activity not found"))?;

        // 4. Slots remain
        if activity.available_slots <= 0 {
            debug!("Activity {} is sold out", activity_id);
            return Err(CoreError::conflict(NO_SLOTS));
        }

        // 5. No duplicate triple
        let exists = self
            .bookings
            .booking_exists(user_id, activity_id, booking_date)
            .await
            .map_err(CoreError::internal)?;
        if exists {
            return Err(CoreError::conflict(DUPLICATE_BOOKING));
        }

        // The checks above can go stale under concurrent requests; the store
        // re-applies them atomically.
        let new_booking = NewBooking { user_id, activity_id, booking_date };
        match self.bookings.reserve_slot(&new_booking).await.map_err(CoreError::internal)? {
            ReservationOutcome::Reserved(booking) => {
                info!(
                    "Booking {} created for activity {} on {} ({} slots left)",
                    booking.booking.id, activity_id, booking_date, booking.activity.available_slots
                );
                Ok(booking)
            }
            ReservationOutcome::SoldOut => Err(CoreError::conflict(NO_SLOTS)),
            ReservationOutcome::Duplicate => Err(CoreError::conflict(DUPLICATE_BOOKING)),
            ReservationOutcome::ActivityMissing => Err(CoreError::not_found("Activity not found")),
        }
    }

    pub async fn cancel_booking(&self, user_id: Uuid, raw_booking_id: &str) -> CoreResult<Uuid> {
        if raw_booking_id.trim().is_empty() {
            return Err(CoreError::validation("Booking ID is required"));
        }
        let booking_id = parse_id(raw_booking_id, "booking")?;

        // Someone else's booking looks exactly like a missing one.
        let booking = self
            .bookings
            .find_owned_booking(booking_id, user_id)
            .await
            .map_err(CoreError::internal)?
            .ok_or_else(|| CoreError::not_found("Booking not found"))?;

        if booking.booking_date < self.clock.today() {
            return Err(CoreError::conflict(PAST_CANCELLATION));
        }

        match self.bookings.release_slot(&booking).await.map_err(CoreError::internal)? {
            ReleaseOutcome::Released { activity_id } => {
                info!("Booking {} cancelled, slot returned to activity {}", booking_id, activity_id);
                Ok(booking_id)
            }
            ReleaseOutcome::Missing => {
                warn!("Booking {} disappeared before it could be cancelled", booking_id);
                Err(CoreError::not_found("Booking not found"))
            }
        }
    }

    pub async fn list_my_bookings(&self, user_id: Uuid) -> CoreResult<Vec<BookingWithActivity>> {
        self.bookings
            .list_user_bookings(user_id)
            .await
            .map_err(CoreError::internal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::memory::InMemoryStore;
    use crate::models::{Activity, Booking, SlotCorrection};
    use crate::repository::RepoResult;
    use crate::search::ActivityQuery;
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Barrier;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 15).unwrap()
    }

    fn engine_with(activities: Vec<Activity>) -> (BookingEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_activities(activities));
        let engine = BookingEngine::new(store.clone(), store.clone(), Arc::new(FixedClock(today())));
        (engine, store)
    }

    fn request(activity: &Activity, date: &str) -> CreateBookingRequest {
        CreateBookingRequest {
            activity_id: Some(activity.id.to_string()),
            booking_date: Some(date.to_string()),
        }
    }

    fn assert_conflict(result: CoreResult<impl std::fmt::Debug>, expected: &str) {
        match result {
            Err(CoreError::ConflictError(msg)) => assert_eq!(msg, expected),
            other => panic!("expected conflict '{}', got {:?}", expected, other),
        }
    }

    #[tokio::test]
    async fn test_single_slot_scenario() {
        let a1 = Activity::new("Rock Climbing", "Indoor wall", "Pune", 30.0, 1);
        let (engine, store) = engine_with(vec![a1.clone()]);
        let user = Uuid::new_v4();

        let booked = engine.create_booking(user, &request(&a1, "2099-01-01")).await.unwrap();
        assert_eq!(booked.booking.activity_id, a1.id);
        assert_eq!(booked.activity.available_slots, 0);
        assert_eq!(store.activity(a1.id).unwrap().available_slots, 0);

        assert_conflict(engine.create_booking(user, &request(&a1, "2099-01-01")).await, NO_SLOTS);

        let other = Uuid::new_v4();
        assert_conflict(engine.create_booking(other, &request(&a1, "2099-03-04")).await, NO_SLOTS);
    }

    #[tokio::test]
    async fn test_duplicate_triple_is_rejected() {
        let a = Activity::new("Cooking Class", "Thai curries", "Bangkok", 60.0, 5);
        let (engine, store) = engine_with(vec![a.clone()]);
        let user = Uuid::new_v4();

        engine.create_booking(user, &request(&a, "2030-07-01")).await.unwrap();
        assert_conflict(engine.create_booking(user, &request(&a, "2030-07-01")).await, DUPLICATE_BOOKING);
        assert_eq!(store.activity(a.id).unwrap().available_slots, 4);

        // A different date is a different triple.
        engine.create_booking(user, &request(&a, "2030-07-02")).await.unwrap();
        assert_eq!(store.booking_count(), 2);
    }

    #[tokio::test]
    async fn test_sold_out_rejects_regardless_of_other_fields() {
        let a = Activity::new("Zip Line", "Canopy tour", "Coorg", 80.0, 0);
        let (engine, _) = engine_with(vec![a.clone()]);
        for date in ["2030-06-15", "2031-01-01", "2099-12-31"] {
            assert_conflict(engine.create_booking(Uuid::new_v4(), &request(&a, date)).await, NO_SLOTS);
        }
    }

    #[tokio::test]
    async fn test_validation_order() {
        let a = Activity::new("Zip Line", "Canopy tour", "Coorg", 80.0, 0);
        let (engine, _) = engine_with(vec![a.clone()]);
        let user = Uuid::new_v4();

        let missing = CreateBookingRequest { activity_id: None, booking_date: Some("2030-07-01".into()) };
        assert!(matches!(engine.create_booking(user, &missing).await, Err(CoreError::ValidationError(_))));

        let no_date = CreateBookingRequest { activity_id: Some(a.id.to_string()), booking_date: None };
        assert!(matches!(engine.create_booking(user, &no_date).await, Err(CoreError::ValidationError(_))));

        // Past date wins over sold out.
        match engine.create_booking(user, &request(&a, "2030-06-14")).await {
            Err(CoreError::ValidationError(msg)) => assert_eq!(msg, PAST_DATE),
            other => panic!("unexpected {:?}", other),
        }

        // Unknown activity wins over everything that needs the row.
        let ghost = Activity::new("Ghost", "", "", 0.0, 1);
        assert!(matches!(
            engine.create_booking(user, &request(&ghost, "2030-07-01")).await,
            Err(CoreError::NotFoundError(_))
        ));

        let garbage = CreateBookingRequest { activity_id: Some(a.id.to_string()), booking_date: Some("next week".into()) };
        assert!(matches!(engine.create_booking(user, &garbage).await, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_today_is_bookable_and_timestamps_are_accepted() {
        let a = Activity::new("Yoga", "Sunrise session", "Rishikesh", 15.0, 10);
        let (engine, _) = engine_with(vec![a.clone()]);
        let user = Uuid::new_v4();

        engine.create_booking(user, &request(&a, "2030-06-15")).await.unwrap();
        let booked = engine.create_booking(user, &request(&a, "2030-06-16T18:30:00Z")).await.unwrap();
        assert_eq!(booked.booking.booking_date, NaiveDate::from_ymd_opt(2030, 6, 16).unwrap());
    }

    #[tokio::test]
    async fn test_create_then_list_includes_booking_once() {
        let a = Activity::new("Surfing", "Learn to surf", "Goa", 40.0, 3);
        let b = Activity::new("Sailing", "Harbour sail", "Mumbai", 90.0, 3);
        let (engine, _) = engine_with(vec![a.clone(), b.clone()]);
        let user = Uuid::new_v4();

        let first = engine.create_booking(user, &request(&a, "2030-07-01")).await.unwrap();
        let second = engine.create_booking(user, &request(&b, "2030-07-01")).await.unwrap();
        engine.create_booking(Uuid::new_v4(), &request(&a, "2030-07-01")).await.unwrap();

        let mine = engine.list_my_bookings(user).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine.iter().filter(|b| b.booking.id == first.booking.id).count(), 1);
        assert_eq!(mine[0].booking.id, second.booking.id);
        let joined = mine.iter().find(|b| b.booking.id == first.booking.id).unwrap();
        assert_eq!(joined.activity.title, "Surfing");
        assert_eq!(joined.activity.price, 40.0);
        // Snapshot reflects the current counter, after the other user's booking.
        assert_eq!(joined.activity.available_slots, 1);
    }

    #[tokio::test]
    async fn test_create_then_cancel_restores_slots() {
        let a = Activity::new("Paragliding", "Tandem flight", "Bir", 120.0, 2);
        let (engine, store) = engine_with(vec![a.clone()]);
        let user = Uuid::new_v4();

        let booked = engine.create_booking(user, &request(&a, "2030-06-20")).await.unwrap();
        assert_eq!(store.activity(a.id).unwrap().available_slots, 1);

        let cancelled = engine.cancel_booking(user, &booked.booking.id.to_string()).await.unwrap();
        assert_eq!(cancelled, booked.booking.id);
        assert_eq!(store.activity(a.id).unwrap().available_slots, 2);
        assert!(engine.list_my_bookings(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_hides_other_users_bookings() {
        let a = Activity::new("Paragliding", "Tandem flight", "Bir", 120.0, 2);
        let (engine, _) = engine_with(vec![a.clone()]);
        let owner = Uuid::new_v4();
        let booked = engine.create_booking(owner, &request(&a, "2030-06-20")).await.unwrap();

        let stranger = engine.cancel_booking(Uuid::new_v4(), &booked.booking.id.to_string()).await;
        let missing = engine.cancel_booking(owner, &Uuid::new_v4().to_string()).await;
        match (stranger, missing) {
            (Err(CoreError::NotFoundError(a)), Err(CoreError::NotFoundError(b))) => assert_eq!(a, b),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_date_boundary() {
        let a = Activity::new("Museum Tour", "Guided", "Delhi", 10.0, 5);
        let (engine, store) = engine_with(vec![a.clone()]);
        let user = Uuid::new_v4();

        let mut ids = Vec::new();
        for date in [today().pred_opt().unwrap(), today()] {
            let booking = Booking {
                id: Uuid::new_v4(),
                user_id: user,
                activity_id: a.id,
                booking_date: date,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };
            ids.push(booking.id);
            store.insert_booking(booking);
        }

        assert_conflict(engine.cancel_booking(user, &ids[0].to_string()).await, PAST_CANCELLATION);
        assert_eq!(engine.cancel_booking(user, &ids[1].to_string()).await.unwrap(), ids[1]);
    }

    /// Serves every activity as it looked when the snapshot was taken, so the
    /// engine's slot check keeps passing after the store has sold out.
    struct StaleActivities {
        store: Arc<InMemoryStore>,
        snapshot: Activity,
    }

    #[async_trait]
    impl ActivityRepository for StaleActivities {
        async fn list_activities(&self, query: &ActivityQuery) -> RepoResult<(Vec<Activity>, i64)> {
            self.store.list_activities(query).await
        }

        async fn get_activity(&self, id: Uuid) -> RepoResult<Option<Activity>> {
            Ok((id == self.snapshot.id).then(|| self.snapshot.clone()))
        }

        async fn count_activities(&self) -> RepoResult<i64> {
            self.store.count_activities().await
        }

        async fn reconcile_slots(&self) -> RepoResult<Vec<SlotCorrection>> {
            self.store.reconcile_slots().await
        }
    }

    /// Never reports an existing booking, leaving the duplicate check to `reserve_slot`.
    struct BlindBookings(Arc<InMemoryStore>);

    #[async_trait]
    impl BookingRepository for BlindBookings {
        async fn find_owned_booking(&self, id: Uuid, user_id: Uuid) -> RepoResult<Option<Booking>> {
            self.0.find_owned_booking(id, user_id).await
        }

        async fn booking_exists(&self, _: Uuid, _: Uuid, _: NaiveDate) -> RepoResult<bool> {
            Ok(false)
        }

        async fn reserve_slot(&self, booking: &NewBooking) -> RepoResult<ReservationOutcome> {
            self.0.reserve_slot(booking).await
        }

        async fn release_slot(&self, booking: &Booking) -> RepoResult<ReleaseOutcome> {
            self.0.release_slot(booking).await
        }

        async fn list_user_bookings(&self, user_id: Uuid) -> RepoResult<Vec<BookingWithActivity>> {
            self.0.list_user_bookings(user_id).await
        }
    }

    fn stale_engine(activity: &Activity) -> (BookingEngine, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::with_activities(vec![activity.clone()]));
        let activities = StaleActivities { store: store.clone(), snapshot: activity.clone() };
        let engine = BookingEngine::new(
            Arc::new(activities),
            Arc::new(BlindBookings(store.clone())),
            Arc::new(FixedClock(today())),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn test_reservation_rejects_what_stale_checks_let_through() {
        let last = Activity::new("Hot Air Balloon", "Sunrise flight", "Jaipur", 250.0, 1);
        let (engine, store) = stale_engine(&last);

        engine.create_booking(Uuid::new_v4(), &request(&last, "2030-08-01")).await.unwrap();
        assert_conflict(engine.create_booking(Uuid::new_v4(), &request(&last, "2030-08-01")).await, NO_SLOTS);
        assert_eq!(store.activity(last.id).unwrap().available_slots, 0);
        assert_eq!(store.booking_count(), 1);

        let roomy = Activity::new("Cooking Class", "Thai curries", "Bangkok", 60.0, 5);
        let (engine, store) = stale_engine(&roomy);
        let user = Uuid::new_v4();

        engine.create_booking(user, &request(&roomy, "2030-08-01")).await.unwrap();
        assert_conflict(engine.create_booking(user, &request(&roomy, "2030-08-01")).await, DUPLICATE_BOOKING);
        assert_eq!(store.activity(roomy.id).unwrap().available_slots, 4);
        assert_eq!(store.booking_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bookings_never_oversell() {
        let a = Activity::new("Hot Air Balloon", "Sunrise flight", "Jaipur", 250.0, 1);
        let (engine, store) = stale_engine(&a);
        let engine = Arc::new(engine);
        let barrier = Arc::new(Barrier::new(16));

        // Every task passes the engine's checks; only the reservation can refuse them.
        let mut handles = Vec::new();
        for _ in 0..16 {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let req = request(&a, "2030-08-01");
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                engine.create_booking(Uuid::new_v4(), &req).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert_conflict(Err::<(), _>(e), NO_SLOTS),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(store.activity(a.id).unwrap().available_slots, 0);
        assert_eq!(store.booking_count(), 1);
    }
}
