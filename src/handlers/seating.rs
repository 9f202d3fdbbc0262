use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::{Seat, Table};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Serialize)]
struct TableWithSeats {
    #[serde(flatten)]
    table: Table,
    seats: Vec<Seat>,
}

/// Ticket tiers for a general-admission event.
pub async fn ticket_tiers(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let event = state.reservations.live_event_by_slug(&slug).await?;

    if event.is_seated() {
        return Err(AppError::Validation(
            "this is a seated event; use the tables endpoint instead".into(),
        ));
    }

    let tiers = state.reservations.tiers_for_event(event.id).await?;
    Ok(success(json!({ "tiers": tiers }), "Ticket tiers retrieved").into_response())
}

/// Seating layout for a seated event: active tables with their seats.
pub async fn tables(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, AppError> {
    let event = state.reservations.live_event_by_slug(&slug).await?;

    if !event.is_seated() {
        return Err(AppError::Validation(
            "this is a general admission event; use the ticket-tiers endpoint instead".into(),
        ));
    }

    let tables = state.reservations.tables_for_event(event.id).await?;
    let mut layout = Vec::with_capacity(tables.len());
    for table in tables {
        let seats = state.reservations.seats_for_table(table.id).await?;
        layout.push(TableWithSeats { table, seats });
    }

    Ok(success(json!({ "tables": layout }), "Tables retrieved").into_response())
}

/// Individual seats for one table sold per-seat.
pub async fn seats(
    State(state): State<AppState>,
    Path((slug, table_id)): Path<(String, Uuid)>,
) -> Result<Response, AppError> {
    let event = state.reservations.live_event_by_slug(&slug).await?;

    if !event.is_seated() {
        return Err(AppError::Validation(
            "this is a general admission event".into(),
        ));
    }

    let table = state.reservations.active_table(event.id, table_id).await?;
    if table.sell_as_whole {
        return Err(AppError::Validation(
            "this table is sold as a whole; individual seats are not available".into(),
        ));
    }

    let seats = state.reservations.seats_for_table(table.id).await?;
    Ok(success(json!({ "table": table, "seats": seats }), "Seats retrieved").into_response())
}

#[derive(Deserialize)]
pub struct ReserveRequest {
    #[serde(default)]
    pub tables: Vec<Uuid>,
    #[serde(default)]
    pub seats: Vec<Uuid>,
}

/// Place a time-boxed hold on tables and/or seats.
pub async fn reserve(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<ReserveRequest>,
) -> Result<Response, AppError> {
    let event = state.reservations.live_event_by_slug(&slug).await?;

    if !event.is_seated() {
        return Err(AppError::Validation(
            "reservations are only available for seated events".into(),
        ));
    }

    let now = state.reservations.now();
    if let Some(reason) = event.purchase_blocked_reason(now) {
        return Err(AppError::CannotPurchase { reason });
    }

    if request.tables.is_empty() && request.seats.is_empty() {
        return Err(AppError::Validation(
            "select at least one table or seat to reserve".into(),
        ));
    }

    let hold = state
        .reservations
        .reserve(&event, &request.tables, &request.seats)
        .await?;

    Ok(created(hold, "Reservation created successfully").into_response())
}

/// Checkout summary: what a token currently holds and when the hold runs
/// out. 404 once the hold has expired or never existed.
pub async fn reservation_summary(
    State(state): State<AppState>,
    Path(token): Path<Uuid>,
) -> Result<Response, AppError> {
    let held = state.reservations.reservation_items(token).await?;
    if held.is_empty() {
        return Err(AppError::NotFound(
            "reservation not found or expired".into(),
        ));
    }
    Ok(success(held, "Reservation retrieved").into_response())
}

#[derive(Deserialize)]
pub struct ReleaseRequest {
    pub token: Uuid,
}

/// Give a hold back early. Idempotent by design: releasing an unknown token
/// succeeds quietly.
pub async fn release(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(request): Json<ReleaseRequest>,
) -> Result<Response, AppError> {
    // Slug is only checked for existence; the token scopes the actual work
    state.reservations.live_event_by_slug(&slug).await?;
    state.reservations.release(request.token).await?;
    Ok(empty_success("Reservation released successfully").into_response())
}
