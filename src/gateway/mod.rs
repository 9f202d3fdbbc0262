use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::utils::error::AppError;

pub mod stripe;

pub use stripe::StripeGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("webhook signature verification failed: {0}")]
    SignatureInvalid(String),

    #[error("malformed gateway payload: {0}")]
    Malformed(String),

    #[error("gateway request failed: {0}")]
    Request(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SignatureInvalid(_) => AppError::SignatureInvalid,
            other => AppError::Gateway(other.to_string()),
        }
    }
}

/// One hosted-checkout line as the gateway wants it: integer minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    /// Price in minor units (centavos).
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub customer_email: String,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque round-trip data: order id/number and, for seated events, the
    /// reservation token.
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// Metadata echoed back by the gateway on session/intent objects.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EventMetadata {
    pub order_id: Option<String>,
    pub order_number: Option<String>,
    pub reservation_token: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ChargeObject {
    pub id: String,
    pub payment_intent: Option<String>,
}

/// The closed set of provider events the reconciler acts on. Anything else is
/// an explicit `Ignored`, not a silent fallthrough.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    CheckoutSessionCompleted(CheckoutSessionObject),
    PaymentFailed(PaymentIntentObject),
    ChargeRefunded(ChargeObject),
    Ignored { event_type: String },
}

/// The payment provider boundary. Everything the core needs from Stripe (or a
/// stand-in during tests) goes through these two operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError>;

    /// Verify the signature over a raw webhook body and parse it into a
    /// [`WebhookEvent`]. Tampering must fail here, before any processing.
    fn construct_webhook_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError>;
}
