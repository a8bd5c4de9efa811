use activa_core::models::{ActivitySnapshot, Booking, BookingWithActivity, NewBooking};
use activa_core::repository::{BookingRepository, ReleaseOutcome, ReservationOutcome, RepoResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

const BOOKING_COLUMNS: &str = "id, user_id, activity_id, booking_date, created_at, updated_at";

pub struct StoreBookingRepository {
    pool: PgPool,
}

impl StoreBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    booking_date: NaiveDate,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            user_id: row.user_id,
            activity_id: row.activity_id,
            booking_date: row.booking_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: Uuid,
    title: String,
    description: String,
    location: String,
    price: f64,
    available_slots: i32,
}

impl From<SnapshotRow> for ActivitySnapshot {
    fn from(row: SnapshotRow) -> Self {
        ActivitySnapshot {
            id: row.id,
            title: row.title,
            description: row.description,
            location: row.location,
            price: row.price,
            available_slots: row.available_slots,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookingWithActivityRow {
    #[sqlx(flatten)]
    booking: BookingRow,
    title: String,
    description: String,
    location: String,
    price: f64,
    available_slots: i32,
}

impl From<BookingWithActivityRow> for BookingWithActivity {
    fn from(row: BookingWithActivityRow) -> Self {
        let activity = ActivitySnapshot {
            id: row.booking.activity_id,
            title: row.title,
            description: row.description,
            location: row.location,
            price: row.price,
            available_slots: row.available_slots,
        };
        BookingWithActivity { booking: row.booking.into(), activity }
    }
}

#[async_trait]
impl BookingRepository for StoreBookingRepository {
    async fn find_owned_booking(
        &self,
        id: Uuid,
        user_id: Uuid,
    ) -> RepoResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND user_id = $2",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Booking::from))
    }

    async fn booking_exists(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        booking_date: NaiveDate,
    ) -> RepoResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM bookings WHERE user_id = $1 AND activity_id = $2 AND booking_date = $3)",
        )
        .bind(user_id)
        .bind(activity_id)
        .bind(booking_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn reserve_slot(
        &self,
        booking: &NewBooking,
    ) -> RepoResult<ReservationOutcome> {
        let mut tx = self.pool.begin().await?;

        // Conditional decrement: the row lock serialises concurrent reservations.
        let activity: Option<SnapshotRow> = sqlx::query_as(
            r#"
            UPDATE activities
            SET available_slots = available_slots - 1, updated_at = NOW()
            WHERE id = $1 AND available_slots > 0
            RETURNING id, title, description, location, price, available_slots
            "#,
        )
        .bind(booking.activity_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(activity) = activity else {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM activities WHERE id = $1)")
                .bind(booking.activity_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(if exists {
                ReservationOutcome::SoldOut
            } else {
                ReservationOutcome::ActivityMissing
            });
        };

        let inserted = sqlx::query_as::<_, BookingRow>(&format!(
            "INSERT INTO bookings (user_id, activity_id, booking_date) VALUES ($1, $2, $3) RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(booking.user_id)
        .bind(booking.activity_id)
        .bind(booking.booking_date)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                debug!("Unique violation on booking triple, rolling back slot decrement");
                tx.rollback().await?;
                return Ok(ReservationOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        tx.commit().await?;

        Ok(ReservationOutcome::Reserved(BookingWithActivity {
            booking: row.into(),
            activity: activity.into(),
        }))
    }

    async fn release_slot(
        &self,
        booking: &Booking,
    ) -> RepoResult<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let activity_id: Option<Uuid> = sqlx::query_scalar(
            "DELETE FROM bookings WHERE id = $1 AND user_id = $2 RETURNING activity_id",
        )
        .bind(booking.id)
        .bind(booking.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(activity_id) = activity_id else {
            tx.rollback().await?;
            return Ok(ReleaseOutcome::Missing);
        };

        sqlx::query(
            r#"
            UPDATE activities
            SET available_slots = LEAST(available_slots + 1, total_slots), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(activity_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(ReleaseOutcome::Released { activity_id })
    }

    async fn list_user_bookings(
        &self,
        user_id: Uuid,
    ) -> RepoResult<Vec<BookingWithActivity>> {
        let rows: Vec<BookingWithActivityRow> = sqlx::query_as(
            r#"
            SELECT b.id, b.user_id, b.activity_id, b.booking_date, b.created_at, b.updated_at,
                   a.title, a.description, a.location, a.price, a.available_slots
            FROM bookings b
            JOIN activities a ON a.id = b.activity_id
            WHERE b.user_id = $1
            ORDER BY b.created_at DESC, b.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(BookingWithActivity::from).collect())
    }
}
