//! Reservation lifecycle against a real Postgres: holds, releases, expiry,
//! and the exclusivity guarantees around them.

mod common;

use chrono::Duration;
use rust_decimal_macros::dec;
use uuid::Uuid;

use boleto_server::models::{SeatingType, UnitStatus};
use boleto_server::utils::error::AppError;
use common::*;

#[tokio::test]
async fn reserve_places_hold_and_flips_status() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "Table 1", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;
    let hold = app
        .state
        .reservations
        .reserve(&event, &[table_id], &[])
        .await
        .expect("reserve should succeed");

    assert_eq!(hold.tables.len(), 1);
    assert_eq!(hold.tables[0].status, UnitStatus::Reserved);
    assert_eq!(hold.expires_at, test_start_time() + Duration::minutes(15));
    assert_eq!(table_status(&app.pool, table_id).await, UnitStatus::Reserved);
    assert_eq!(table_reservation_count(&app.pool).await, 1);
}

#[tokio::test]
async fn overlapping_holds_are_mutually_exclusive() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_a = insert_table(&app.pool, event_id, "A", 8, dec!(2000.00), true).await;
    let table_b = insert_table(&app.pool, event_id, "B", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;

    app.state
        .reservations
        .reserve(&event, &[table_a], &[])
        .await
        .expect("first hold should succeed");

    // Second buyer wants A and B; A is taken, so the whole request fails
    let err = app
        .state
        .reservations
        .reserve(&event, &[table_a, table_b], &[])
        .await
        .expect_err("overlapping hold should fail");
    assert!(matches!(err, AppError::UnitUnavailable(_)));

    // ...and the failed attempt must not have touched B
    assert_eq!(table_status(&app.pool, table_b).await, UnitStatus::Available);
    assert_eq!(table_reservation_count(&app.pool).await, 1);
}

#[tokio::test]
async fn failed_reserve_leaves_no_rows_behind() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "A", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;

    let err = app
        .state
        .reservations
        .reserve(&event, &[table_id, Uuid::new_v4()], &[])
        .await
        .expect_err("unknown table id should fail");
    assert!(matches!(err, AppError::UnitUnavailable(_)));

    assert_eq!(table_reservation_count(&app.pool).await, 0);
    assert_eq!(table_status(&app.pool, table_id).await, UnitStatus::Available);
}

#[tokio::test]
async fn whole_table_cannot_be_reserved_per_seat_and_vice_versa() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let whole = insert_table(&app.pool, event_id, "Whole", 8, dec!(2000.00), true).await;
    let per_seat = insert_table(&app.pool, event_id, "PerSeat", 4, dec!(0.00), false).await;
    let seat_on_whole = insert_seat(&app.pool, whole, "W-1", dec!(250.00)).await;

    let event = load_event(&app.pool, event_id).await;

    // A per-seat table can't be bought whole
    let err = app
        .state
        .reservations
        .reserve(&event, &[per_seat], &[])
        .await
        .expect_err("per-seat table must not be reservable whole");
    assert!(matches!(err, AppError::UnitUnavailable(_)));

    // A seat on a sell-whole table can't be bought alone
    let err = app
        .state
        .reservations
        .reserve(&event, &[], &[seat_on_whole])
        .await
        .expect_err("seat on whole table must not be reservable");
    assert!(matches!(err, AppError::UnitUnavailable(_)));

    assert_eq!(table_reservation_count(&app.pool).await, 0);
    assert_eq!(seat_reservation_count(&app.pool).await, 0);
}

#[tokio::test]
async fn release_returns_units_and_is_idempotent() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "A", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;
    let hold = app
        .state
        .reservations
        .reserve(&event, &[table_id], &[])
        .await
        .expect("reserve should succeed");

    app.state
        .reservations
        .release(hold.token)
        .await
        .expect("release should succeed");
    assert_eq!(table_status(&app.pool, table_id).await, UnitStatus::Available);
    assert_eq!(table_reservation_count(&app.pool).await, 0);

    // Second release of the same token is a quiet no-op
    app.state
        .reservations
        .release(hold.token)
        .await
        .expect("repeated release should still succeed");
}

#[tokio::test]
async fn validate_rejects_expired_hold_before_sweep_runs() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "A", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;
    let hold = app
        .state
        .reservations
        .reserve(&event, &[table_id], &[])
        .await
        .expect("reserve should succeed");

    assert!(app
        .state
        .reservations
        .validate(hold.token, &[table_id], &[])
        .await
        .unwrap());

    // Past expiry but before any sweep: the rows still exist, yet the hold
    // must already read as invalid
    app.clock.advance(Duration::minutes(16));
    assert_eq!(table_reservation_count(&app.pool).await, 1);
    assert!(!app
        .state
        .reservations
        .validate(hold.token, &[table_id], &[])
        .await
        .unwrap());
}

#[tokio::test]
async fn expiry_sweep_frees_units_for_the_next_buyer() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "Seated", 4, dec!(0.00), false).await;
    let seat_a = insert_seat(&app.pool, table_id, "A1", dec!(250.00)).await;
    let seat_b = insert_seat(&app.pool, table_id, "A2", dec!(250.00)).await;

    let event = load_event(&app.pool, event_id).await;
    app.state
        .reservations
        .reserve(&event, &[], &[seat_a, seat_b])
        .await
        .expect("reserve should succeed");

    // Competing buyer is locked out while the hold is live
    let err = app
        .state
        .reservations
        .reserve(&event, &[], &[seat_a])
        .await
        .expect_err("held seat must be unavailable");
    assert!(matches!(err, AppError::UnitUnavailable(_)));

    app.clock.advance(Duration::minutes(16));
    let released = app.state.reservations.expire().await.unwrap();
    assert_eq!(released, 2);
    assert_eq!(seat_status(&app.pool, seat_a).await, UnitStatus::Available);
    assert_eq!(seat_status(&app.pool, seat_b).await, UnitStatus::Available);
    assert_eq!(seat_reservation_count(&app.pool).await, 0);

    // Now the competing buyer gets through
    app.state
        .reservations
        .reserve(&event, &[], &[seat_a])
        .await
        .expect("freed seat should be reservable");
}

#[tokio::test]
async fn sweep_skips_unexpired_and_converted_holds() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let fresh = insert_table(&app.pool, event_id, "Fresh", 8, dec!(2000.00), true).await;
    let sold = insert_table(&app.pool, event_id, "Sold", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;

    let sold_hold = app
        .state
        .reservations
        .reserve(&event, &[sold], &[])
        .await
        .expect("reserve should succeed");

    // Convert the first hold into a sale
    let order_id: Uuid = sqlx::query_scalar(
        "INSERT INTO orders (order_number, event_id, customer_name, customer_email, \
         status, subtotal, total) \
         VALUES ('ORD-TEST-0001', $1, 'Ana', 'ana@example.com', 'completed', 2000, 2000) \
         RETURNING id",
    )
    .bind(event_id)
    .fetch_one(&app.pool)
    .await
    .unwrap();
    app.state
        .reservations
        .complete(sold_hold.token, order_id)
        .await
        .expect("complete should succeed");

    // Second hold placed later, so it is still live at sweep time
    app.clock.advance(Duration::minutes(10));
    app.state
        .reservations
        .reserve(&event, &[fresh], &[])
        .await
        .expect("reserve should succeed");

    app.clock.advance(Duration::minutes(10));
    let released = app.state.reservations.expire().await.unwrap();

    // The converted hold is long past expiry but must stay sold; the fresh
    // hold has 5 minutes left
    assert_eq!(released, 0);
    assert_eq!(table_status(&app.pool, sold).await, UnitStatus::Sold);
    assert_eq!(table_status(&app.pool, fresh).await, UnitStatus::Reserved);
}

#[tokio::test]
async fn reservation_summary_lists_held_units_until_expiry() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let whole = insert_table(&app.pool, event_id, "Whole", 8, dec!(2000.00), true).await;
    let per_seat = insert_table(&app.pool, event_id, "PerSeat", 4, dec!(0.00), false).await;
    let seat_id = insert_seat(&app.pool, per_seat, "A1", dec!(250.00)).await;

    let event = load_event(&app.pool, event_id).await;
    let hold = app
        .state
        .reservations
        .reserve(&event, &[whole], &[seat_id])
        .await
        .expect("reserve should succeed");

    let held = app
        .state
        .reservations
        .reservation_items(hold.token)
        .await
        .unwrap();
    assert_eq!(held.tables.len(), 1);
    assert_eq!(held.tables[0].id, whole);
    assert_eq!(held.seats.len(), 1);
    assert_eq!(held.seats[0].id, seat_id);
    assert_eq!(held.expires_at, Some(hold.expires_at));
    assert!(!held.is_empty());

    // Expired but unswept: the summary must already come back empty
    app.clock.advance(Duration::minutes(16));
    let held = app
        .state
        .reservations
        .reservation_items(hold.token)
        .await
        .unwrap();
    assert!(held.is_empty());
    assert_eq!(held.expires_at, None);

    // Unknown token reads the same as an expired one
    let held = app
        .state
        .reservations
        .reservation_items(Uuid::new_v4())
        .await
        .unwrap();
    assert!(held.is_empty());
}

#[tokio::test]
async fn duplicate_ids_in_request_are_collapsed() {
    let app = spawn_app().await;
    let event_id = insert_event(&app.pool, "gala", SeatingType::Seated, 100).await;
    let table_id = insert_table(&app.pool, event_id, "A", 8, dec!(2000.00), true).await;

    let event = load_event(&app.pool, event_id).await;
    let hold = app
        .state
        .reservations
        .reserve(&event, &[table_id, table_id], &[])
        .await
        .expect("duplicate ids should not break the hold");

    assert_eq!(hold.tables.len(), 1);
    assert_eq!(table_reservation_count(&app.pool).await, 1);
}
