use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An add-on (merch, parking, dinner upgrade). A plain counted pool with no
/// reservation phase: `quantity_sold` only moves when the webhook reconciler
/// completes or refunds an order.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventItem {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    /// `None` means unlimited.
    pub max_quantity: Option<i32>,
    pub quantity_sold: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventItem {
    pub fn available_quantity(&self) -> Option<i32> {
        self.max_quantity.map(|q| (q - self.quantity_sold).max(0))
    }

    pub fn is_available(&self) -> bool {
        if !self.is_active {
            return false;
        }
        match self.max_quantity {
            None => true,
            Some(max) => self.quantity_sold < max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn add_on(max_quantity: Option<i32>, sold: i32) -> EventItem {
        let now = Utc::now();
        EventItem {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "Parking pass".into(),
            description: None,
            price: dec!(50.00),
            max_quantity,
            quantity_sold: sold,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn capped_item_sells_out() {
        let item = add_on(Some(5), 5);
        assert!(!item.is_available());
        assert_eq!(item.available_quantity(), Some(0));

        let item = add_on(Some(5), 4);
        assert!(item.is_available());
        assert_eq!(item.available_quantity(), Some(1));
    }

    #[test]
    fn uncapped_item_is_always_available_while_active() {
        let mut item = add_on(None, 10_000);
        assert!(item.is_available());
        assert_eq!(item.available_quantity(), None);

        item.is_active = false;
        assert!(!item.is_available());
    }
}
