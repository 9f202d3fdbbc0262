use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::models::event::PurchaseBlockedReason;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A requested table or seat is inactive, already held/sold, or a
    /// seat-only table was requested whole.
    #[error("{0}")]
    UnitUnavailable(String),

    /// Reservation token missing, expired, or not covering the requested units.
    #[error("Invalid or expired reservation")]
    InvalidReservation,

    /// A counted pool (ticket tier or add-on item) cannot satisfy the request.
    #[error("{message}")]
    InventoryUnavailable {
        message: String,
        available: Option<i32>,
    },

    /// The event itself refuses purchases (not live, closed, past deadline,
    /// sold out).
    #[error("Cannot purchase tickets: {reason}")]
    CannotPurchase { reason: PurchaseBlockedReason },

    /// Webhook payload failed signature verification.
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Payment gateway error: {0}")]
    Gateway(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnitUnavailable(_)
            | AppError::InvalidReservation
            | AppError::InventoryUnavailable { .. }
            | AppError::CannotPurchase { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::SignatureInvalid => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::UnitUnavailable(_) => "UNIT_UNAVAILABLE",
            AppError::InvalidReservation => "INVALID_RESERVATION",
            AppError::InventoryUnavailable { .. } => "INVENTORY_UNAVAILABLE",
            AppError::CannotPurchase { .. } => "CANNOT_PURCHASE",
            AppError::SignatureInvalid => "SIGNATURE_INVALID",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Gateway(_) => "GATEWAY_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::Database(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::Gateway(msg) => {
                error!(message = %msg, "Payment gateway error");
            }
            other => {
                warn!(code = other.code(), message = %other, "Request rejected");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Structured details let the client render the real blocking reason.
        let details = match &self {
            AppError::InventoryUnavailable { available, .. } => {
                available.map(|n| json!({ "available": n }))
            }
            AppError::CannotPurchase { reason } => Some(json!({ "reason": reason })),
            _ => None,
        };

        // Never expose driver-level details to the client.
        let public_message = match &self {
            AppError::Database(_) => "A database error occurred".to_string(),
            other => other.to_string(),
        };

        error_response(code, public_message, details, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_are_unprocessable() {
        let err = AppError::UnitUnavailable("table 'Mesa 1' is not available".into());
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "UNIT_UNAVAILABLE");

        assert_eq!(
            AppError::InvalidReservation.status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn signature_failure_is_bad_request() {
        assert_eq!(
            AppError::SignatureInvalid.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::SignatureInvalid.code(), "SIGNATURE_INVALID");
    }
}
