use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{Activity, Booking, BookingWithActivity, NewBooking, SlotCorrection};
use crate::repository::{
    ActivityRepository, BookingRepository, ReleaseOutcome, ReservationOutcome, RepoResult,
};
use crate::rate_limit::RateLimiter;
use crate::search::{ActivitySort, ActivityQuery};

#[derive(Default)]
struct Inner {
    activities: HashMap<Uuid, Activity>,
    bookings: Vec<Booking>,
}

/// In-memory activity and booking tables.
///
/// A single lock covers both tables, so each reserve or release is atomic
/// in the same way the Postgres transaction is.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(activities: impl IntoIterator<Item = Activity>) -> Self {
        let store = Self::new();
        for activity in activities {
            store.insert_activity(activity);
        }
        store
    }

    pub fn insert_activity(&self, activity: Activity) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.activities.insert(activity.id, activity);
        }
    }

    pub fn activity(&self, id: Uuid) -> Option<Activity> {
        self.inner.lock().ok()?.activities.get(&id).cloned()
    }

    /// Overwrites a counter without touching bookings.
    pub fn set_available_slots(&self, id: Uuid, slots: i32) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(activity) = inner.activities.get_mut(&id) {
                activity.available_slots = slots;
            }
        }
    }

    pub fn booking_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.bookings.len()).unwrap_or(0)
    }

    /// Inserts a booking row directly, bypassing slot accounting.
    pub fn insert_booking(&self, booking: Booking) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.bookings.push(booking);
        }
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| "in-memory store lock poisoned".into())
    }
}

/// Text keys compare case-insensitively, matching `LOWER(..)` ordering in Postgres.
fn compare(sort: ActivitySort, a: &Activity, b: &Activity) -> Ordering {
    let primary = match sort {
        ActivitySort::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        ActivitySort::PriceLow => a.price.total_cmp(&b.price),
        ActivitySort::PriceHigh => b.price.total_cmp(&a.price),
        ActivitySort::Location => a.location.to_lowercase().cmp(&b.location.to_lowercase()),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn join(inner: &Inner, booking: &Booking) -> Option<BookingWithActivity> {
    inner.activities.get(&booking.activity_id).map(|activity| BookingWithActivity {
        booking: booking.clone(),
        activity: activity.snapshot(),
    })
}

#[async_trait]
impl ActivityRepository for InMemoryStore {
    async fn list_activities(
        &self,
        query: &ActivityQuery,
    ) -> RepoResult<(Vec<Activity>, i64)> {
        let inner = self.lock()?;
        let mut matching: Vec<Activity> = inner
            .activities
            .values()
            .filter(|a| query.matches(a))
            .cloned()
            .collect();
        matching.sort_by(|a, b| compare(query.sort, a, b));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_activity(
        &self,
        id: Uuid,
    ) -> RepoResult<Option<Activity>> {
        Ok(self.lock()?.activities.get(&id).cloned())
    }

    async fn count_activities(&self) -> RepoResult<i64> {
        Ok(self.lock()?.activities.len() as i64)
    }

    async fn reconcile_slots(&self) -> RepoResult<Vec<SlotCorrection>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let mut booked: HashMap<Uuid, i32> = HashMap::new();
        for booking in &inner.bookings {
            *booked.entry(booking.activity_id).or_default() += 1;
        }

        let mut corrections = Vec::new();
        for activity in inner.activities.values_mut() {
            let expected = (activity.total_slots - booked.get(&activity.id).copied().unwrap_or(0)).max(0);
            if activity.available_slots != expected {
                corrections.push(SlotCorrection {
                    activity_id: activity.id,
                    recorded: activity.available_slots,
                    corrected: expected,
                });
                activity.available_slots = expected;
                activity.updated_at = Utc::now();
            }
        }
        Ok(corrections)
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn find_owned_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<Booking>> {
        Ok(self
            .lock()?
            .bookings
            .iter()
            .find(|b| b.id == id && b.user_id == user_id)
            .cloned())
    }

    async fn booking_exists(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        booking_date: NaiveDate,
    ) -> RepoResult<bool> {
        Ok(self.lock()?.bookings.iter().any(|b| {
            b.user_id == user_id && b.activity_id == activity_id && b.booking_date == booking_date
        }))
    }

    async fn reserve_slot(
        &self,
        booking: &NewBooking,
    ) -> RepoResult<ReservationOutcome> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let duplicate = inner.bookings.iter().any(|b| {
            b.user_id == booking.user_id
                && b.activity_id == booking.activity_id
                && b.booking_date == booking.booking_date
        });

        let Some(activity) = inner.activities.get_mut(&booking.activity_id) else {
            return Ok(ReservationOutcome::ActivityMissing);
        };
        if activity.available_slots <= 0 {
            return Ok(ReservationOutcome::SoldOut);
        }
        if duplicate {
            return Ok(ReservationOutcome::Duplicate);
        }

        let now = Utc::now();
        activity.available_slots -= 1;
        activity.updated_at = now;
        let snapshot = activity.snapshot();

        let created = Booking {
            id: Uuid::new_v4(),
            user_id: booking.user_id,
            activity_id: booking.activity_id,
            booking_date: booking.booking_date,
            created_at: now,
            updated_at: now,
        };
        inner.bookings.push(created.clone());

        Ok(ReservationOutcome::Reserved(BookingWithActivity {
            booking: created,
            activity: snapshot,
        }))
    }

    async fn release_slot(
        &self,
        booking: &Booking,
    ) -> RepoResult<ReleaseOutcome> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(pos) = inner
            .bookings
            .iter()
            .position(|b| b.id == booking.id && b.user_id == booking.user_id)
        else {
            return Ok(ReleaseOutcome::Missing);
        };
        let removed = inner.bookings.remove(pos);

        if let Some(activity) = inner.activities.get_mut(&removed.activity_id) {
            activity.available_slots = (activity.available_slots + 1).min(activity.total_slots);
            activity.updated_at = Utc::now();
        }
        Ok(ReleaseOutcome::Released { activity_id: removed.activity_id })
    }

    async fn list_user_bookings(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Vec<BookingWithActivity>> {
        let inner = self.lock()?;
        // Reverse insertion order first so equal timestamps still list the newest row first.
        let mut owned: Vec<&Booking> = inner.bookings.iter().rev().filter(|b| b.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned.into_iter().filter_map(|b| join(&inner, b)).collect())
    }
}

/// Fixed-window hit counters keyed like the Redis limiter.
#[derive(Default)]
pub struct InMemoryRateLimiter {
    windows: Mutex<HashMap<String, (i64, DateTime<Utc>)>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit at `now`. A window is reopened only once its end has passed.
    pub fn hit_at(&self, key: &str, window_seconds: i64, now: DateTime<Utc>) -> RepoResult<i64> {
        let mut windows = self.windows.lock().map_err(|_| "rate limiter lock poisoned")?;
        let window = windows.entry(key.to_string()).or_insert((0, now));
        if now >= window.1 + Duration::seconds(window_seconds) {
            *window = (0, now);
        }
        window.0 += 1;
        Ok(window.0)
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn hit(&self, key: &str, window_seconds: i64) -> RepoResult<i64> {
        self.hit_at(key, window_seconds, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::PriceBucket;

    fn seeded() -> InMemoryStore {
        InMemoryStore::with_activities(vec![
            Activity::new("Pottery Basics", "Wheel throwing", "Pune", 30.0, 4),
            Activity::new("Cave Diving", "Advanced dive", "Andaman", 300.0, 2),
            Activity::new("Nature Walk", "Guided forest trail", "Pune Hills", 20.0, 10),
            Activity::new("Salsa Night", "Beginner dance", "Mumbai", 50.0, 0),
            Activity::new("Guitar Lesson", "Learn chords", "Mumbai", 25.0, 5),
        ])
    }

    #[tokio::test]
    async fn test_listing_filters_sorts_and_counts() {
        let store = seeded();

        let query = ActivityQuery { price: PriceBucket::From25To50, ..Default::default() };
        let (page, total) = store.list_activities(&query).await.unwrap();
        let titles: Vec<_> = page.iter().map(|a| a.title.as_str()).collect();
        // Salsa Night is priced in range but sold out.
        assert_eq!(titles, vec!["Guitar Lesson", "Pottery Basics"]);
        assert_eq!(total, 2);

        let query = ActivityQuery { location: Some("PUNE".into()), sort: ActivitySort::PriceHigh, ..Default::default() };
        let (page, _) = store.list_activities(&query).await.unwrap();
        let titles: Vec<_> = page.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Pottery Basics", "Nature Walk"]);
    }

    #[tokio::test]
    async fn test_listing_pages() {
        let store = seeded();
        let query = ActivityQuery { page: 2, limit: 3, sort: ActivitySort::PriceLow, ..Default::default() };
        let (page, total) = store.list_activities(&query).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "Cave Diving");
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift_once() {
        let store = seeded();
        let (page, _) = store.list_activities(&ActivityQuery::default()).await.unwrap();
        let pottery = page.iter().find(|a| a.title == "Pottery Basics").unwrap().id;

        store.insert_booking(Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            activity_id: pottery,
            booking_date: NaiveDate::from_ymd_opt(2099, 1, 1).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        let corrections = store.reconcile_slots().await.unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].recorded, 4);
        assert_eq!(corrections[0].corrected, 3);
        assert_eq!(store.activity(pottery).unwrap().available_slots, 3);

        assert!(store.reconcile_slots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_title_order_ignores_case() {
        let store = InMemoryStore::with_activities(vec![
            Activity::new("banana boat", "", "Goa", 10.0, 1),
            Activity::new("Apple Picking", "", "Shimla", 10.0, 1),
            Activity::new("Cycling", "", "goa", 10.0, 1),
        ]);
        let (page, _) = store.list_activities(&ActivityQuery::default()).await.unwrap();
        let titles: Vec<_> = page.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Apple Picking", "banana boat", "Cycling"]);
    }

    #[tokio::test]
    async fn test_reserve_slot_rechecks_stock_and_duplicates() {
        let open = Activity::new("Kayaking", "River run", "Rishikesh", 45.0, 3);
        let full = Activity::new("Salsa Night", "Beginner dance", "Mumbai", 50.0, 0);
        let store = InMemoryStore::with_activities(vec![open.clone(), full.clone()]);
        let user = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();

        let sold_out = NewBooking { user_id: user, activity_id: full.id, booking_date: date };
        assert_eq!(store.reserve_slot(&sold_out).await.unwrap(), ReservationOutcome::SoldOut);

        let triple = NewBooking { user_id: user, activity_id: open.id, booking_date: date };
        assert!(matches!(store.reserve_slot(&triple).await.unwrap(), ReservationOutcome::Reserved(_)));
        assert_eq!(store.reserve_slot(&triple).await.unwrap(), ReservationOutcome::Duplicate);

        let ghost = NewBooking { user_id: user, activity_id: Uuid::new_v4(), booking_date: date };
        assert_eq!(store.reserve_slot(&ghost).await.unwrap(), ReservationOutcome::ActivityMissing);

        // Refused reservations leave both tables untouched.
        assert_eq!(store.activity(open.id).unwrap().available_slots, 2);
        assert_eq!(store.activity(full.id).unwrap().available_slots, 0);
        assert_eq!(store.booking_count(), 1);
    }

    #[test]
    fn test_rate_window_is_not_extended_by_hits() {
        let limiter = InMemoryRateLimiter::new();
        let start = Utc::now();
        let at = |secs: i64| start + Duration::seconds(secs);

        // One hit every 50s against a 60s window: the window still rolls over.
        let counts: Vec<i64> = [0, 50, 100, 150]
            .iter()
            .map(|&t| limiter.hit_at("ratelimit:10.0.0.1", 60, at(t)).unwrap())
            .collect();
        assert_eq!(counts, vec![1, 2, 1, 2]);

        // Keys are counted independently.
        assert_eq!(limiter.hit_at("ratelimit:10.0.0.2", 60, at(150)).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_within_limit() {
        let limiter = InMemoryRateLimiter::new();
        let mut allowed = Vec::new();
        for _ in 0..3 {
            allowed.push(crate::rate_limit::within_limit(&limiter, "k", 2, 60).await.unwrap());
        }
        assert_eq!(allowed, vec![true, true, false]);
    }
}
