use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A time-boxed hold on one table. At most one row per table (unique
/// constraint); the row existing is the authority for "this table is held".
/// Once the hold converts to a sale the row is kept with `order_id` set, as
/// the audit trail from order to unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TableReservation {
    pub id: Uuid,
    pub table_id: Uuid,
    pub session_token: Uuid,
    pub order_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Seat-level counterpart of [`TableReservation`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeatReservation {
    pub id: Uuid,
    pub seat_id: Uuid,
    pub session_token: Uuid,
    pub order_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableReservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl SeatReservation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
