use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a physical unit (table or seat).
///
/// Legal transitions: available → reserved → sold → available (refund) and
/// available → reserved → available (release / expiry). A sold unit only
/// returns through a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "unit_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Available,
    Reserved,
    Sold,
}

/// A seated-event table. Sold whole when `sell_as_whole` is set; otherwise it
/// is only a container for individually sold seats and is never purchasable
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Table {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub capacity: i32,
    pub price: Decimal,
    pub sell_as_whole: bool,
    pub status: UnitStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Table {
    pub fn is_available(&self) -> bool {
        self.is_active && self.status == UnitStatus::Available
    }
}
