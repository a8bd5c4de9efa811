use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// A bookable offering with a finite pool of slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: f64,
    pub available_slots: i32,
    /// Provisioned capacity. `available_slots` never exceeds it.
    pub total_slots: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        location: impl Into<String>,
        price: f64,
        slots: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            location: location.into(),
            price,
            available_slots: slots,
            total_slots: slots,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn snapshot(&self) -> ActivitySnapshot {
        ActivitySnapshot {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            price: self.price,
            available_slots: self.available_slots,
        }
    }
}

/// The activity columns returned alongside a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySnapshot {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: f64,
    pub available_slots: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub activity_id: Uuid,
    pub booking_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingWithActivity {
    #[serde(flatten)]
    pub booking: Booking,
    pub activity: ActivitySnapshot,
}

/// The business fields of a booking that has passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub activity_id: Uuid,
    pub booking_date: NaiveDate,
}

/// One counter repaired by slot reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotCorrection {
    pub activity_id: Uuid,
    pub recorded: i32,
    pub corrected: i32,
}

/// Parses an opaque identifier supplied by a client.
pub fn parse_id(raw: &str, what: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| CoreError::validation(format!("invalid {} id", what)))
}
