use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::gateway::GatewayError;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

/// Stripe webhook intake. Signature failures get a 400 so Stripe flags the
/// endpoint; everything past the signature check returns 200 regardless of
/// outcome, because retrying a payload we cannot process only produces
/// duplicate deliveries of the same unprocessable payload.
pub async fn handle_stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::SignatureInvalid)?;

    let event = match state.gateway.construct_webhook_event(&body, signature) {
        Ok(event) => event,
        Err(GatewayError::SignatureInvalid(reason)) => {
            warn!(%reason, "Rejecting webhook with invalid signature");
            return Err(AppError::SignatureInvalid);
        }
        Err(err) => {
            warn!(%err, "Acknowledging unparseable webhook payload");
            return Ok(empty_success("OK").into_response());
        }
    };

    if let Err(err) = state.webhooks.handle(event).await {
        // Acknowledge anyway; the reconciler is idempotent and a manual
        // replay from the Stripe dashboard can recover a dropped event
        error!(%err, "Webhook processing failed");
    }

    Ok(empty_success("OK").into_response())
}
