use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_item_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderItemType {
    Ticket,
    ExtraItem,
}

/// One purchased line. Name/price/quantity are snapshots taken at order
/// creation and never recomputed, so historical orders stay stable when
/// prices change later. The nullable unit references tell the reconciler
/// what to increment, flip, or undo.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_type: OrderItemType,
    pub ticket_tier_id: Option<Uuid>,
    pub table_id: Option<Uuid>,
    pub seat_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub item_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a line item actually points at. The nullable foreign keys are a
/// storage detail; reconciliation code matches on this instead of probing
/// columns one by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineItemRef {
    Tier(Uuid),
    Table(Uuid),
    Seat(Uuid),
    AddOn(Uuid),
    /// Ticket line with no tier reference; counted on the event itself.
    LegacyTicket,
    /// The referenced unit was deleted after purchase; nothing to adjust.
    Detached,
}

impl OrderItem {
    pub fn line_ref(&self) -> LineItemRef {
        match self.item_type {
            OrderItemType::Ticket => {
                if let Some(tier_id) = self.ticket_tier_id {
                    LineItemRef::Tier(tier_id)
                } else if let Some(table_id) = self.table_id {
                    LineItemRef::Table(table_id)
                } else if let Some(seat_id) = self.seat_id {
                    LineItemRef::Seat(seat_id)
                } else {
                    LineItemRef::LegacyTicket
                }
            }
            OrderItemType::ExtraItem => match self.item_id {
                Some(item_id) => LineItemRef::AddOn(item_id),
                None => LineItemRef::Detached,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(item_type: OrderItemType) -> OrderItem {
        let now = Utc::now();
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            item_type,
            ticket_tier_id: None,
            table_id: None,
            seat_id: None,
            item_id: None,
            item_name: "line".into(),
            quantity: 1,
            unit_price: dec!(100.00),
            total_price: dec!(100.00),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn ticket_lines_resolve_in_tier_table_seat_order() {
        let tier_id = Uuid::new_v4();
        let table_id = Uuid::new_v4();
        let seat_id = Uuid::new_v4();

        let mut line = item(OrderItemType::Ticket);
        line.ticket_tier_id = Some(tier_id);
        assert_eq!(line.line_ref(), LineItemRef::Tier(tier_id));

        let mut line = item(OrderItemType::Ticket);
        line.table_id = Some(table_id);
        assert_eq!(line.line_ref(), LineItemRef::Table(table_id));

        let mut line = item(OrderItemType::Ticket);
        line.seat_id = Some(seat_id);
        assert_eq!(line.line_ref(), LineItemRef::Seat(seat_id));

        assert_eq!(item(OrderItemType::Ticket).line_ref(), LineItemRef::LegacyTicket);
    }

    #[test]
    fn extra_item_lines_resolve_to_add_on() {
        let item_id = Uuid::new_v4();
        let mut line = item(OrderItemType::ExtraItem);
        line.item_id = Some(item_id);
        assert_eq!(line.line_ref(), LineItemRef::AddOn(item_id));

        // Reference wiped by a deleted add-on: no counter to move
        assert_eq!(
            item(OrderItemType::ExtraItem).line_ref(),
            LineItemRef::Detached
        );
    }
}
