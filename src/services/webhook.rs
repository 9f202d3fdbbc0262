use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::{ChargeObject, CheckoutSessionObject, PaymentIntentObject, WebhookEvent};
use crate::models::{Event, LineItemRef, Order, OrderItem, OrderStatus, UnitStatus};
use crate::services::reservation::ReservationService;
use crate::utils::clock::Clock;
use crate::utils::error::AppError;

/// Translates asynchronous payment-provider events into order and inventory
/// state transitions.
///
/// Per-order state machine: pending → completed, pending → failed,
/// completed → refunded. Everything else is a logged no-op. Delivery is
/// at-least-once, so every handler checks the order status under a row lock
/// before applying effects — replaying an event never double-applies.
#[derive(Clone)]
pub struct WebhookReconciler {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl WebhookReconciler {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<(), AppError> {
        match event {
            WebhookEvent::CheckoutSessionCompleted(session) => {
                self.handle_completed(session).await
            }
            WebhookEvent::PaymentFailed(intent) => self.handle_failed(intent).await,
            WebhookEvent::ChargeRefunded(charge) => self.handle_refund(charge).await,
            WebhookEvent::Ignored { event_type } => {
                info!(%event_type, "Ignoring webhook event type");
                Ok(())
            }
        }
    }

    /// Payment settled: mark the order completed and commit its inventory in
    /// the same transaction. Seated units flip to sold via the reservation
    /// ledger; counted pools are incremented from the order's line items.
    async fn handle_completed(&self, session: CheckoutSessionObject) -> Result<(), AppError> {
        let Some(order_id) = parse_order_id(session.metadata.order_id.as_deref()) else {
            warn!(session_id = %session.id, "Checkout completed but no order_id in metadata");
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(order) = order else {
            // Possibly test data or another environment; drop, don't retry
            warn!(%order_id, "Order not found for completed checkout session");
            return Ok(());
        };

        if order.status != OrderStatus::Pending {
            info!(
                order_number = %order.order_number,
                status = ?order.status,
                "Order already processed, skipping completion"
            );
            return Ok(());
        }

        sqlx::query(
            "UPDATE orders SET status = $1, stripe_payment_intent_id = $2, paid_at = $3, \
             updated_at = now() WHERE id = $4",
        )
        .bind(OrderStatus::Completed)
        .bind(&session.payment_intent)
        .bind(self.clock.now())
        .bind(order.id)
        .execute(&mut *tx)
        .await?;

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(order.event_id)
            .fetch_one(&mut *tx)
            .await?;

        let items = order_items(&mut *tx, order.id).await?;

        if event.is_seated() {
            if let Some(token) = session
                .metadata
                .reservation_token
                .as_deref()
                .and_then(|t| Uuid::parse_str(t).ok())
            {
                ReservationService::complete_in(&mut *tx, token, order.id).await?;
            }

            // Flip the exact units named on the order; covers lines even if
            // the token went missing from the metadata
            for item in &items {
                match item.line_ref() {
                    LineItemRef::Table(table_id) => {
                        set_table_status(&mut *tx, table_id, UnitStatus::Sold).await?;
                    }
                    LineItemRef::Seat(seat_id) => {
                        set_seat_status(&mut *tx, seat_id, UnitStatus::Sold).await?;
                    }
                    _ => {}
                }
            }
        } else {
            for item in &items {
                match item.line_ref() {
                    LineItemRef::Tier(tier_id) => {
                        adjust_tier_sold(&mut *tx, tier_id, item.quantity).await?;
                    }
                    LineItemRef::LegacyTicket => {
                        adjust_event_sold(&mut *tx, order.event_id, item.quantity).await?;
                    }
                    _ => {}
                }
            }
        }

        for item in &items {
            if let LineItemRef::AddOn(item_id) = item.line_ref() {
                adjust_item_sold(&mut *tx, item_id, item.quantity).await?;
            }
        }

        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            "Order completed"
        );
        Ok(())
    }

    /// Payment failed: flip a pending order to failed. Inventory was never
    /// decremented, and any hold expires on its own timer.
    async fn handle_failed(&self, intent: PaymentIntentObject) -> Result<(), AppError> {
        let Some(order_id) = parse_order_id(intent.metadata.order_id.as_deref()) else {
            return Ok(());
        };

        let result = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status = $3",
        )
        .bind(OrderStatus::Failed)
        .bind(order_id)
        .bind(OrderStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!(%order_id, "Payment failed, order marked failed");
        }
        Ok(())
    }

    /// Charge refunded: the exact inverse of completion, driven by the same
    /// order_items rows that completion used.
    async fn handle_refund(&self, charge: ChargeObject) -> Result<(), AppError> {
        let Some(payment_intent) = charge.payment_intent.as_deref() else {
            warn!(charge_id = %charge.id, "Refunded charge has no payment intent");
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE stripe_payment_intent_id = $1 FOR UPDATE",
        )
        .bind(payment_intent)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            warn!(%payment_intent, "Order not found for refunded charge");
            return Ok(());
        };

        if order.status != OrderStatus::Completed {
            info!(
                order_number = %order.order_number,
                status = ?order.status,
                "Refund for non-completed order, skipping"
            );
            return Ok(());
        }

        sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
            .bind(OrderStatus::Refunded)
            .bind(order.id)
            .execute(&mut *tx)
            .await?;

        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
            .bind(order.event_id)
            .fetch_one(&mut *tx)
            .await?;

        let items = order_items(&mut *tx, order.id).await?;

        if event.is_seated() {
            for item in &items {
                match item.line_ref() {
                    LineItemRef::Table(table_id) => {
                        set_table_status(&mut *tx, table_id, UnitStatus::Available).await?;
                    }
                    LineItemRef::Seat(seat_id) => {
                        set_seat_status(&mut *tx, seat_id, UnitStatus::Available).await?;
                    }
                    _ => {}
                }
            }
        } else {
            for item in &items {
                match item.line_ref() {
                    LineItemRef::Tier(tier_id) => {
                        adjust_tier_sold(&mut *tx, tier_id, -item.quantity).await?;
                    }
                    LineItemRef::LegacyTicket => {
                        adjust_event_sold(&mut *tx, order.event_id, -item.quantity).await?;
                    }
                    _ => {}
                }
            }
        }

        for item in &items {
            if let LineItemRef::AddOn(item_id) = item.line_ref() {
                adjust_item_sold(&mut *tx, item_id, -item.quantity).await?;
            }
        }

        tx.commit().await?;

        info!(order_number = %order.order_number, "Order refunded");
        Ok(())
    }
}

fn parse_order_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s).ok())
}

async fn order_items(conn: &mut PgConnection, order_id: Uuid) -> Result<Vec<OrderItem>, AppError> {
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

async fn set_table_status(
    conn: &mut PgConnection,
    table_id: Uuid,
    status: UnitStatus,
) -> Result<(), AppError> {
    sqlx::query("UPDATE tables SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(table_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn set_seat_status(
    conn: &mut PgConnection,
    seat_id: Uuid,
    status: UnitStatus,
) -> Result<(), AppError> {
    sqlx::query("UPDATE seats SET status = $1, updated_at = now() WHERE id = $2")
        .bind(status)
        .bind(seat_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn adjust_tier_sold(
    conn: &mut PgConnection,
    tier_id: Uuid,
    delta: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE ticket_tiers SET quantity_sold = quantity_sold + $1, updated_at = now() \
         WHERE id = $2",
    )
    .bind(delta)
    .bind(tier_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn adjust_event_sold(
    conn: &mut PgConnection,
    event_id: Uuid,
    delta: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE events SET tickets_sold = tickets_sold + $1, updated_at = now() WHERE id = $2",
    )
    .bind(delta)
    .bind(event_id)
    .execute(conn)
    .await?;
    Ok(())
}

async fn adjust_item_sold(
    conn: &mut PgConnection,
    item_id: Uuid,
    delta: i32,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE event_items SET quantity_sold = quantity_sold + $1, updated_at = now() \
         WHERE id = $2",
    )
    .bind(delta)
    .bind(item_id)
    .execute(conn)
    .await?;
    Ok(())
}
