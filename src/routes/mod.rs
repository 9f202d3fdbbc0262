use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::config::{create_cors_layer, security_headers};
use crate::handlers::{checkout, health_check, seating, webhook};
use crate::state::AppState;
use tower_http::trace::TraceLayer;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/events/:slug/ticket-tiers", get(seating::ticket_tiers))
        .route("/api/events/:slug/tables", get(seating::tables))
        .route(
            "/api/events/:slug/tables/:table_id/seats",
            get(seating::seats),
        )
        .route("/api/events/:slug/reserve", post(seating::reserve))
        .route("/api/events/:slug/release", post(seating::release))
        .route(
            "/api/reservations/:token",
            get(seating::reservation_summary),
        )
        .route("/api/checkout/create-session", post(checkout::create_session))
        .route("/api/orders/:order_number", get(checkout::show_order))
        .route("/api/webhooks/stripe", post(webhook::handle_stripe))
        .layer(middleware::from_fn(security_headers))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
