use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::table::UnitStatus;

/// An individually sold seat. Only meaningful when its parent table has
/// `sell_as_whole = false`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Seat {
    pub id: Uuid,
    pub table_id: Uuid,
    pub label: String,
    pub price: Decimal,
    pub status: UnitStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Seat {
    pub fn is_available(&self) -> bool {
        self.is_active && self.status == UnitStatus::Available
    }
}
