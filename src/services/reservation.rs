use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{
    Event, Seat, SeatReservation, Table, TableReservation, TicketTier, UnitStatus,
};
use crate::utils::clock::Clock;
use crate::utils::error::AppError;

/// A successful hold: the opaque token plus the units it covers.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationHold {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
    pub tables: Vec<Table>,
    pub seats: Vec<Seat>,
}

/// The units currently covered by a token, for checkout summaries.
#[derive(Debug, Clone, Serialize)]
pub struct ReservedUnits {
    pub expires_at: Option<DateTime<Utc>>,
    pub tables: Vec<Table>,
    pub seats: Vec<Seat>,
}

impl ReservedUnits {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.seats.is_empty()
    }
}

/// Time-boxed exclusive holds on tables and seats.
///
/// Every mutating operation locks the unit rows (`SELECT ... FOR UPDATE`,
/// ordered by id so multi-row holds can't deadlock each other) before
/// touching status, which is what serializes two buyers racing for the same
/// seat. The reservation row is the authority for "held"; the unit's status
/// column is a cache kept in lockstep inside the same transaction.
#[derive(Clone)]
pub struct ReservationService {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl ReservationService {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Claim the given tables and seats for one checkout attempt.
    ///
    /// All-or-nothing: any unavailable or invalid unit aborts the whole
    /// transaction, so a failed reserve leaves no new reservation rows.
    pub async fn reserve(
        &self,
        event: &Event,
        table_ids: &[Uuid],
        seat_ids: &[Uuid],
    ) -> Result<ReservationHold, AppError> {
        let table_ids = dedup(table_ids);
        let seat_ids = dedup(seat_ids);

        let now = self.clock.now();
        let token = Uuid::new_v4();
        let expires_at = now + Duration::minutes(i64::from(event.reservation_minutes.max(1)));

        let mut tx = self.pool.begin().await?;

        let mut tables: Vec<Table> = Vec::new();
        if !table_ids.is_empty() {
            tables = sqlx::query_as::<_, Table>(
                "SELECT * FROM tables \
                 WHERE event_id = $1 AND id = ANY($2) \
                 ORDER BY id \
                 FOR UPDATE",
            )
            .bind(event.id)
            .bind(&table_ids)
            .fetch_all(&mut *tx)
            .await?;

            if tables.len() != table_ids.len() {
                return Err(AppError::UnitUnavailable(
                    "one or more tables do not exist for this event".into(),
                ));
            }

            for table in &tables {
                if !table.sell_as_whole {
                    return Err(AppError::UnitUnavailable(format!(
                        "table '{}' must be purchased by individual seats",
                        table.name
                    )));
                }
                if !table.is_available() {
                    return Err(AppError::UnitUnavailable(format!(
                        "table '{}' is not available",
                        table.name
                    )));
                }

                sqlx::query(
                    "INSERT INTO table_reservations (table_id, session_token, expires_at) \
                     VALUES ($1, $2, $3)",
                )
                .bind(table.id)
                .bind(token)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("UPDATE tables SET status = $1, updated_at = now() WHERE id = ANY($2)")
                .bind(UnitStatus::Reserved)
                .bind(&table_ids)
                .execute(&mut *tx)
                .await?;
        }

        let mut seats: Vec<Seat> = Vec::new();
        if !seat_ids.is_empty() {
            // Only seats whose parent table is sold per-seat qualify; a
            // short row count means invalid ids or seat-only violations.
            seats = sqlx::query_as::<_, Seat>(
                "SELECT s.* FROM seats s \
                 JOIN tables t ON t.id = s.table_id \
                 WHERE s.id = ANY($1) AND t.event_id = $2 AND t.sell_as_whole = FALSE \
                 ORDER BY s.id \
                 FOR UPDATE OF s",
            )
            .bind(&seat_ids)
            .bind(event.id)
            .fetch_all(&mut *tx)
            .await?;

            if seats.len() != seat_ids.len() {
                return Err(AppError::UnitUnavailable(
                    "one or more seats are not available for individual purchase".into(),
                ));
            }

            for seat in &seats {
                if !seat.is_available() {
                    return Err(AppError::UnitUnavailable(format!(
                        "seat '{}' is not available",
                        seat.label
                    )));
                }

                sqlx::query(
                    "INSERT INTO seat_reservations (seat_id, session_token, expires_at) \
                     VALUES ($1, $2, $3)",
                )
                .bind(seat.id)
                .bind(token)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("UPDATE seats SET status = $1, updated_at = now() WHERE id = ANY($2)")
                .bind(UnitStatus::Reserved)
                .bind(&seat_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        for table in &mut tables {
            table.status = UnitStatus::Reserved;
        }
        for seat in &mut seats {
            seat.status = UnitStatus::Reserved;
        }

        Ok(ReservationHold {
            token,
            expires_at,
            tables,
            seats,
        })
    }

    /// Drop every hold under the token and return its units to the pool.
    /// Converted holds (order attached) are left alone. Idempotent: an
    /// unknown or already-released token is a no-op.
    pub async fn release(&self, token: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE tables SET status = $1, updated_at = now() \
             WHERE id IN (SELECT table_id FROM table_reservations \
                          WHERE session_token = $2 AND order_id IS NULL)",
        )
        .bind(UnitStatus::Available)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM table_reservations WHERE session_token = $1 AND order_id IS NULL")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE seats SET status = $1, updated_at = now() \
             WHERE id IN (SELECT seat_id FROM seat_reservations \
                          WHERE session_token = $2 AND order_id IS NULL)",
        )
        .bind(UnitStatus::Available)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM seat_reservations WHERE session_token = $1 AND order_id IS NULL")
            .bind(token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Does this token hold every one of the requested units, unexpired as of
    /// right now? Expiry is compared against the clock directly; a hold the
    /// sweep hasn't collected yet is still invalid.
    pub async fn validate(
        &self,
        token: Uuid,
        table_ids: &[Uuid],
        seat_ids: &[Uuid],
    ) -> Result<bool, AppError> {
        let table_ids = dedup(table_ids);
        let seat_ids = dedup(seat_ids);
        let now = self.clock.now();

        if !table_ids.is_empty() {
            let covered: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM table_reservations \
                 WHERE session_token = $1 AND table_id = ANY($2) AND expires_at > $3",
            )
            .bind(token)
            .bind(&table_ids)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

            if covered as usize != table_ids.len() {
                return Ok(false);
            }
        }

        if !seat_ids.is_empty() {
            let covered: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM seat_reservations \
                 WHERE session_token = $1 AND seat_id = ANY($2) AND expires_at > $3",
            )
            .bind(token)
            .bind(&seat_ids)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

            if covered as usize != seat_ids.len() {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Convert the hold into a sale once payment has settled. The
    /// reservation rows are kept with the order id stamped on, as the audit
    /// trail linking order to unit.
    pub async fn complete(&self, token: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        Self::complete_in(&mut tx, token, order_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Completion step for callers that already hold a transaction (the
    /// webhook reconciler flips the order and the inventory in one commit).
    pub(crate) async fn complete_in(
        conn: &mut PgConnection,
        token: Uuid,
        order_id: Uuid,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE tables SET status = $1, updated_at = now() \
             WHERE id IN (SELECT table_id FROM table_reservations WHERE session_token = $2)",
        )
        .bind(UnitStatus::Sold)
        .bind(token)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "UPDATE table_reservations SET order_id = $1, updated_at = now() \
             WHERE session_token = $2",
        )
        .bind(order_id)
        .bind(token)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "UPDATE seats SET status = $1, updated_at = now() \
             WHERE id IN (SELECT seat_id FROM seat_reservations WHERE session_token = $2)",
        )
        .bind(UnitStatus::Sold)
        .bind(token)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            "UPDATE seat_reservations SET order_id = $1, updated_at = now() \
             WHERE session_token = $2",
        )
        .bind(order_id)
        .bind(token)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Sweep: return every expired, unconverted hold to the pool. Returns
    /// the number of units released. Locks the unit rows themselves so a
    /// concurrent reserve never observes a half-expired hold.
    pub async fn expire(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await?;

        let expired_tables: Vec<Uuid> = sqlx::query_scalar(
            "SELECT t.id FROM tables t \
             JOIN table_reservations r ON r.table_id = t.id \
             WHERE r.expires_at <= $1 AND r.order_id IS NULL \
             ORDER BY t.id \
             FOR UPDATE OF t",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        if !expired_tables.is_empty() {
            sqlx::query("UPDATE tables SET status = $1, updated_at = now() WHERE id = ANY($2)")
                .bind(UnitStatus::Available)
                .bind(&expired_tables)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM table_reservations WHERE table_id = ANY($1)")
                .bind(&expired_tables)
                .execute(&mut *tx)
                .await?;
        }

        let expired_seats: Vec<Uuid> = sqlx::query_scalar(
            "SELECT s.id FROM seats s \
             JOIN seat_reservations r ON r.seat_id = s.id \
             WHERE r.expires_at <= $1 AND r.order_id IS NULL \
             ORDER BY s.id \
             FOR UPDATE OF s",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        if !expired_seats.is_empty() {
            sqlx::query("UPDATE seats SET status = $1, updated_at = now() WHERE id = ANY($2)")
                .bind(UnitStatus::Available)
                .bind(&expired_seats)
                .execute(&mut *tx)
                .await?;

            sqlx::query("DELETE FROM seat_reservations WHERE seat_id = ANY($1)")
                .bind(&expired_seats)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok((expired_tables.len() + expired_seats.len()) as u64)
    }

    /// Units currently held under a token, for the checkout summary. Expiry
    /// is filtered in code against the injected clock, same rule as
    /// `validate`: an expired-but-unswept row does not count.
    pub async fn reservation_items(&self, token: Uuid) -> Result<ReservedUnits, AppError> {
        let now = self.clock.now();

        let table_rows = sqlx::query_as::<_, TableReservation>(
            "SELECT * FROM table_reservations WHERE session_token = $1",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;

        let seat_rows = sqlx::query_as::<_, SeatReservation>(
            "SELECT * FROM seat_reservations WHERE session_token = $1",
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await?;

        let table_ids: Vec<Uuid> = table_rows
            .iter()
            .filter(|r| !r.is_expired(now))
            .map(|r| r.table_id)
            .collect();
        let seat_ids: Vec<Uuid> = seat_rows
            .iter()
            .filter(|r| !r.is_expired(now))
            .map(|r| r.seat_id)
            .collect();

        let expires_at = table_rows
            .iter()
            .map(|r| r.expires_at)
            .chain(seat_rows.iter().map(|r| r.expires_at))
            .filter(|&e| e > now)
            .min();

        let tables = if table_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as::<_, Table>("SELECT * FROM tables WHERE id = ANY($1) ORDER BY name, id")
                .bind(&table_ids)
                .fetch_all(&self.pool)
                .await?
        };

        let seats = if seat_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as::<_, Seat>("SELECT * FROM seats WHERE id = ANY($1) ORDER BY label, id")
                .bind(&seat_ids)
                .fetch_all(&self.pool)
                .await?
        };

        Ok(ReservedUnits {
            expires_at,
            tables,
            seats,
        })
    }

    // --- read side for availability display (no locks; write paths
    // re-validate under lock before committing) ---

    pub async fn live_event_by_slug(&self, slug: &str) -> Result<Event, AppError> {
        sqlx::query_as::<_, Event>("SELECT * FROM events WHERE slug = $1 AND status = 'live'")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event '{slug}' was not found")))
    }

    pub async fn tiers_for_event(&self, event_id: Uuid) -> Result<Vec<TicketTier>, AppError> {
        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers \
             WHERE event_id = $1 AND is_active = TRUE AND is_hidden = FALSE \
             ORDER BY sort_order, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tiers)
    }

    pub async fn tables_for_event(&self, event_id: Uuid) -> Result<Vec<Table>, AppError> {
        let tables = sqlx::query_as::<_, Table>(
            "SELECT * FROM tables WHERE event_id = $1 AND is_active = TRUE ORDER BY name, id",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    pub async fn active_table(&self, event_id: Uuid, table_id: Uuid) -> Result<Table, AppError> {
        sqlx::query_as::<_, Table>(
            "SELECT * FROM tables WHERE event_id = $1 AND id = $2 AND is_active = TRUE",
        )
        .bind(event_id)
        .bind(table_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("table '{table_id}' was not found")))
    }

    pub async fn seats_for_table(&self, table_id: Uuid) -> Result<Vec<Seat>, AppError> {
        let seats = sqlx::query_as::<_, Seat>(
            "SELECT * FROM seats WHERE table_id = $1 AND is_active = TRUE ORDER BY label, id",
        )
        .bind(table_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(seats)
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}
