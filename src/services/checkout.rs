use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

use crate::gateway::{CheckoutSessionRequest, PaymentGateway, SessionLineItem};
use crate::models::order::order_number_candidate;
use crate::models::{
    Event, EventItem, Order, OrderItem, OrderItemType, OrderStatus, Seat, Table, TicketTier,
};
use crate::services::reservation::ReservationService;
use crate::utils::clock::Clock;
use crate::utils::error::AppError;

const ORDER_NUMBER_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct TierSelection {
    pub tier_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemSelection {
    pub item_id: Uuid,
    pub quantity: i32,
}

/// Buyer-submitted checkout payload. Tier selections drive general-admission
/// events; `tickets` is the legacy per-event counter path; tables/seats plus
/// the reservation token drive seated events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub event_slug: String,
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub tiers: Vec<TierSelection>,
    #[serde(default)]
    pub tickets: i32,
    #[serde(default)]
    pub tables: Vec<Uuid>,
    #[serde(default)]
    pub seats: Vec<Uuid>,
    #[serde(default)]
    pub reservation_token: Option<Uuid>,
    #[serde(default)]
    pub extra_items: Vec<ItemSelection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
    pub order_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// One priced line, snapshotted before order creation. Unit references are
/// carried through to order_items so the reconciler knows what to adjust.
struct PricedLine {
    item_type: OrderItemType,
    tier_id: Option<Uuid>,
    table_id: Option<Uuid>,
    seat_id: Option<Uuid>,
    item_id: Option<Uuid>,
    name: String,
    description: Option<String>,
    quantity: i32,
    unit_price: Decimal,
}

impl PricedLine {
    fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Prices a checkout request, creates the pending order with snapshot line
/// items, and opens the hosted payment session.
///
/// No tier or add-on quantity moves here; counted pools are only adjusted
/// when the webhook reconciler sees the payment settle.
#[derive(Clone)]
pub struct CheckoutService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    reservations: ReservationService,
    gateway: Arc<dyn PaymentGateway>,
    frontend_url: String,
}

impl CheckoutService {
    pub fn new(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        reservations: ReservationService,
        gateway: Arc<dyn PaymentGateway>,
        frontend_url: String,
    ) -> Self {
        Self {
            pool,
            clock,
            reservations,
            gateway,
            frontend_url,
        }
    }

    pub async fn create_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, AppError> {
        let now = self.clock.now();
        let event = self.event_by_slug(&request.event_slug).await?;

        if let Some(reason) = event.purchase_blocked_reason(now) {
            return Err(AppError::CannotPurchase { reason });
        }

        if event.is_seated() {
            self.create_seated_session(event, request, now).await
        } else {
            self.create_general_admission_session(event, request, now)
                .await
        }
    }

    /// General admission: counted pools, no reservation phase. Availability
    /// is checked here best-effort; the pool only actually moves at webhook
    /// completion.
    async fn create_general_admission_session(
        &self,
        event: Event,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResponse, AppError> {
        let mut lines: Vec<PricedLine> = Vec::new();

        if !request.tiers.is_empty() {
            for selection in &request.tiers {
                let tier = sqlx::query_as::<_, TicketTier>(
                    "SELECT * FROM ticket_tiers WHERE event_id = $1 AND id = $2",
                )
                .bind(event.id)
                .bind(selection.tier_id)
                .fetch_optional(&self.pool)
                .await?;

                let Some(tier) = tier else {
                    return Err(AppError::InventoryUnavailable {
                        message: "ticket tier is not available".into(),
                        available: None,
                    });
                };

                if !tier.is_available(now) {
                    return Err(AppError::InventoryUnavailable {
                        message: format!("ticket tier '{}' is not available", tier.name),
                        available: None,
                    });
                }

                if selection.quantity < tier.min_per_order
                    || selection.quantity > tier.max_per_order
                {
                    return Err(AppError::Validation(format!(
                        "'{}' allows between {} and {} tickets per order",
                        tier.name, tier.min_per_order, tier.max_per_order
                    )));
                }

                if let Some(available) = tier.available_quantity() {
                    if selection.quantity > available {
                        return Err(AppError::InventoryUnavailable {
                            message: format!("not enough '{}' tickets available", tier.name),
                            available: Some(available),
                        });
                    }
                }

                lines.push(PricedLine {
                    item_type: OrderItemType::Ticket,
                    tier_id: Some(tier.id),
                    table_id: None,
                    seat_id: None,
                    item_id: None,
                    name: format!("{} - {}", event.name, tier.name),
                    description: tier.description.clone(),
                    quantity: selection.quantity,
                    unit_price: tier.current_price(now),
                });
            }
        } else if request.tickets > 0 {
            // Legacy path: no tiers configured, price from the event itself
            let available = event.tickets_available();
            if request.tickets > available {
                return Err(AppError::InventoryUnavailable {
                    message: "not enough tickets available".into(),
                    available: Some(available),
                });
            }

            lines.push(PricedLine {
                item_type: OrderItemType::Ticket,
                tier_id: None,
                table_id: None,
                seat_id: None,
                item_id: None,
                name: format!("{} - Ticket", event.name),
                description: None,
                quantity: request.tickets,
                unit_price: event.price,
            });
        }

        self.price_extra_items(&event, &request.extra_items, &mut lines)
            .await?;

        if lines.is_empty() {
            return Err(AppError::Validation(
                "checkout requires at least one ticket or item".into(),
            ));
        }

        let order = self
            .create_pending_order(&event, &request, &lines, None, now)
            .await?;

        self.open_gateway_session(&event, order, &lines, None).await
    }

    /// Seated events: the buyer must already hold the exact units under a
    /// valid token. The hold is re-checked under lock inside the
    /// order-creation transaction.
    async fn create_seated_session(
        &self,
        event: Event,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResponse, AppError> {
        let token = request.reservation_token.ok_or(AppError::InvalidReservation)?;

        if request.tables.is_empty() && request.seats.is_empty() {
            return Err(AppError::Validation(
                "seated checkout requires at least one table or seat".into(),
            ));
        }

        if !self
            .reservations
            .validate(token, &request.tables, &request.seats)
            .await?
        {
            return Err(AppError::InvalidReservation);
        }

        let tables = sqlx::query_as::<_, Table>("SELECT * FROM tables WHERE id = ANY($1)")
            .bind(&request.tables)
            .fetch_all(&self.pool)
            .await?;

        let seats = sqlx::query_as::<_, Seat>("SELECT * FROM seats WHERE id = ANY($1)")
            .bind(&request.seats)
            .fetch_all(&self.pool)
            .await?;

        // Parent table names for seat line labels
        let parent_ids: Vec<Uuid> = seats.iter().map(|s| s.table_id).collect();
        let parents: HashMap<Uuid, String> =
            sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM tables WHERE id = ANY($1)")
                .bind(&parent_ids)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        let mut lines: Vec<PricedLine> = Vec::new();

        for table in &tables {
            lines.push(PricedLine {
                item_type: OrderItemType::Ticket,
                tier_id: None,
                table_id: Some(table.id),
                seat_id: None,
                item_id: None,
                name: format!("{} - {} ({} seats)", event.name, table.name, table.capacity),
                description: Some(format!("{} seats", table.capacity)),
                quantity: 1,
                unit_price: table.price,
            });
        }

        for seat in &seats {
            let table_name = parents.get(&seat.table_id).cloned().unwrap_or_default();
            lines.push(PricedLine {
                item_type: OrderItemType::Ticket,
                tier_id: None,
                table_id: None,
                seat_id: Some(seat.id),
                item_id: None,
                name: format!("{} - {} - {}", event.name, table_name, seat.label),
                description: None,
                quantity: 1,
                unit_price: seat.price,
            });
        }

        self.price_extra_items(&event, &request.extra_items, &mut lines)
            .await?;

        let order = self
            .create_pending_order(&event, &request, &lines, Some(token), now)
            .await?;

        self.open_gateway_session(&event, order, &lines, Some(token))
            .await
    }

    async fn price_extra_items(
        &self,
        event: &Event,
        selections: &[ItemSelection],
        lines: &mut Vec<PricedLine>,
    ) -> Result<(), AppError> {
        for selection in selections {
            let item = sqlx::query_as::<_, EventItem>(
                "SELECT * FROM event_items WHERE event_id = $1 AND id = $2",
            )
            .bind(event.id)
            .bind(selection.item_id)
            .fetch_optional(&self.pool)
            .await?;

            let Some(item) = item else {
                return Err(AppError::InventoryUnavailable {
                    message: "item is not available".into(),
                    available: None,
                });
            };

            if !item.is_available() {
                return Err(AppError::InventoryUnavailable {
                    message: format!("item '{}' is not available", item.name),
                    available: None,
                });
            }

            if let Some(available) = item.available_quantity() {
                if selection.quantity > available {
                    return Err(AppError::InventoryUnavailable {
                        message: format!("not enough '{}' available", item.name),
                        available: Some(available),
                    });
                }
            }

            lines.push(PricedLine {
                item_type: OrderItemType::ExtraItem,
                tier_id: None,
                table_id: None,
                seat_id: None,
                item_id: Some(item.id),
                name: item.name.clone(),
                description: item.description.clone(),
                quantity: selection.quantity,
                unit_price: item.price,
            });
        }

        Ok(())
    }

    /// One transaction: re-verify the hold under lock (seated path), insert
    /// the pending order, insert every snapshot line.
    async fn create_pending_order(
        &self,
        event: &Event,
        request: &CheckoutRequest,
        lines: &[PricedLine],
        reservation_token: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Order, AppError> {
        let subtotal: Decimal = lines.iter().map(PricedLine::total).sum();
        let total = subtotal;

        let mut tx = self.pool.begin().await?;

        if let Some(token) = reservation_token {
            self.relock_reservation(&mut tx, token, &request.tables, &request.seats, now)
                .await?;
        }

        let order_number = self.unique_order_number(&mut tx, now).await?;

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders \
             (order_number, event_id, customer_name, customer_email, customer_phone, \
              status, subtotal, total) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING *",
        )
        .bind(&order_number)
        .bind(event.id)
        .bind(&request.customer_name)
        .bind(&request.customer_email)
        .bind(&request.customer_phone)
        .bind(OrderStatus::Pending)
        .bind(subtotal)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        for line in lines {
            sqlx::query(
                "INSERT INTO order_items \
                 (order_id, item_type, ticket_tier_id, table_id, seat_id, item_id, \
                  item_name, quantity, unit_price, total_price) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(order.id)
            .bind(line.item_type)
            .bind(line.tier_id)
            .bind(line.table_id)
            .bind(line.seat_id)
            .bind(line.item_id)
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.total())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Lock the reservation rows and confirm the hold still covers exactly
    /// the requested units and has not expired. Closes the window between
    /// the read-only validation and order creation: a concurrent sweep
    /// blocks on these row locks until the order commit.
    async fn relock_reservation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: Uuid,
        table_ids: &[Uuid],
        seat_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if !table_ids.is_empty() {
            let covered: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM ( \
                     SELECT 1 FROM table_reservations \
                     WHERE session_token = $1 AND table_id = ANY($2) AND expires_at > $3 \
                     FOR UPDATE \
                 ) AS held",
            )
            .bind(token)
            .bind(table_ids)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;

            if covered as usize != table_ids.len() {
                return Err(AppError::InvalidReservation);
            }
        }

        if !seat_ids.is_empty() {
            let covered: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM ( \
                     SELECT 1 FROM seat_reservations \
                     WHERE session_token = $1 AND seat_id = ANY($2) AND expires_at > $3 \
                     FOR UPDATE \
                 ) AS held",
            )
            .bind(token)
            .bind(seat_ids)
            .bind(now)
            .fetch_one(&mut **tx)
            .await?;

            if covered as usize != seat_ids.len() {
                return Err(AppError::InvalidReservation);
            }
        }

        Ok(())
    }

    async fn unique_order_number(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = order_number_candidate(now, &mut rand::thread_rng());
            let taken: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE order_number = $1)")
                    .bind(&candidate)
                    .fetch_one(&mut **tx)
                    .await?;
            if !taken {
                return Ok(candidate);
            }
        }
        Err(AppError::Validation(
            "could not allocate a unique order number".into(),
        ))
    }

    async fn open_gateway_session(
        &self,
        event: &Event,
        order: Order,
        lines: &[PricedLine],
        reservation_token: Option<Uuid>,
    ) -> Result<CheckoutResponse, AppError> {
        let success_url = format!(
            "{}/app/events/{}/checkout-success",
            self.frontend_url, event.slug
        );
        let cancel_url = format!("{}/app/events/{}", self.frontend_url, event.slug);

        let mut metadata = BTreeMap::new();
        metadata.insert("order_id".to_string(), order.id.to_string());
        metadata.insert("order_number".to_string(), order.order_number.clone());
        if let Some(token) = reservation_token {
            metadata.insert("reservation_token".to_string(), token.to_string());
        }

        let line_items = lines
            .iter()
            .map(|line| {
                Ok(SessionLineItem {
                    name: line.name.clone(),
                    description: line.description.clone(),
                    unit_amount: to_minor_units(line.unit_price)?,
                    quantity: i64::from(line.quantity),
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let session = match self
            .gateway
            .create_checkout_session(CheckoutSessionRequest {
                customer_email: order.customer_email.clone(),
                line_items,
                success_url,
                cancel_url,
                metadata,
            })
            .await
        {
            Ok(session) => session,
            Err(err) => {
                // The pending order stays behind without a session id and is
                // picked up by the abandoned-order cleanup.
                warn!(
                    order_number = %order.order_number,
                    error = %err,
                    "Gateway session creation failed; order left pending"
                );
                return Err(err.into());
            }
        };

        sqlx::query(
            "UPDATE orders SET stripe_checkout_session_id = $1, updated_at = now() WHERE id = $2",
        )
        .bind(&session.id)
        .bind(order.id)
        .execute(&self.pool)
        .await?;

        Ok(CheckoutResponse {
            checkout_url: session.url,
            session_id: session.id,
            order_number: order.order_number,
        })
    }

    pub async fn event_by_slug(&self, slug: &str) -> Result<Event, AppError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event '{slug}' was not found")))
    }

    pub async fn show_order(&self, order_number: &str) -> Result<OrderWithItems, AppError> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_number = $1")
            .bind(order_number)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("order '{order_number}' was not found"))
            })?;

        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT * FROM order_items WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderWithItems { order, items })
    }
}

/// Decimal price to gateway minor units (centavos).
fn to_minor_units(price: Decimal) -> Result<i64, AppError> {
    (price * Decimal::from(100))
        .trunc()
        .to_i64()
        .ok_or_else(|| AppError::Validation("price is not representable in minor units".into()))
}
