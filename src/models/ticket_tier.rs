use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A priced, optionally quantity-capped pool of general-admission tickets.
///
/// `quantity_sold` moves only inside the webhook reconciler's transaction
/// (completion increments, refund decrements) — never at reservation or
/// order-creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub early_bird_price: Option<Decimal>,
    pub early_bird_deadline: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub quantity: Option<i32>,
    pub quantity_sold: i32,
    pub sales_start: Option<DateTime<Utc>>,
    pub sales_end: Option<DateTime<Utc>>,
    pub min_per_order: i32,
    pub max_per_order: i32,
    pub is_hidden: bool,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TicketTier {
    /// Early-bird price while the deadline is in the future, list price after.
    /// Never both.
    pub fn current_price(&self, now: DateTime<Utc>) -> Decimal {
        if self.is_early_bird(now) {
            // is_early_bird guarantees the price is present
            self.early_bird_price.unwrap_or(self.price)
        } else {
            self.price
        }
    }

    pub fn is_early_bird(&self, now: DateTime<Utc>) -> bool {
        match (self.early_bird_price, self.early_bird_deadline) {
            (Some(_), Some(deadline)) => now < deadline,
            _ => false,
        }
    }

    /// `None` means unlimited.
    pub fn available_quantity(&self) -> Option<i32> {
        self.quantity.map(|q| (q - self.quantity_sold).max(0))
    }

    pub fn in_sales_window(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.sales_start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.sales_end {
            if now >= end {
                return false;
            }
        }
        true
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || !self.in_sales_window(now) {
            return false;
        }
        match self.available_quantity() {
            None => true,
            Some(n) => n > 0,
        }
    }
}
