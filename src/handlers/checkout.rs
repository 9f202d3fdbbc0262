use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::services::CheckoutRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// Turn a cart into a pending order plus a hosted payment session.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Response, AppError> {
    if request.customer_name.trim().is_empty() {
        return Err(AppError::Validation("customer_name is required".into()));
    }
    if request.customer_email.trim().is_empty() || !request.customer_email.contains('@') {
        return Err(AppError::Validation(
            "a valid customer_email is required".into(),
        ));
    }

    let response = state.checkout.create_session(request).await?;
    Ok(created(response, "Checkout session created").into_response())
}

/// Order lookup by its public order number, used by the post-payment
/// confirmation page.
pub async fn show_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Response, AppError> {
    let order = state.checkout.show_order(&order_number).await?;
    Ok(success(order, "Order retrieved").into_response())
}
