use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::gateway::{
    ChargeObject, CheckoutSession, CheckoutSessionObject, CheckoutSessionRequest, GatewayError,
    PaymentGateway, PaymentIntentObject, WebhookEvent,
};
use crate::utils::clock::Clock;

type HmacSha256 = Hmac<Sha256>;

const API_BASE: &str = "https://api.stripe.com/v1";
const CURRENCY: &str = "mxn";

/// Reject webhook timestamps older than this to blunt replay.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe hosted-checkout client. Talks to the REST API directly: the only
/// two operations the core needs don't justify an SDK.
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    webhook_secret: String,
    clock: Arc<dyn Clock>,
}

impl StripeGateway {
    pub fn new(secret_key: String, webhook_secret: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            webhook_secret,
            clock,
        }
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> Result<(), GatewayError> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = value.parse().ok();
                }
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            GatewayError::SignatureInvalid("missing timestamp in signature header".into())
        })?;

        if candidates.is_empty() {
            return Err(GatewayError::SignatureInvalid(
                "missing v1 signature in header".into(),
            ));
        }

        let age = self.clock.now().timestamp() - timestamp;
        if age.abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(GatewayError::SignatureInvalid(
                "timestamp outside tolerance".into(),
            ));
        }

        for candidate in candidates {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
                .map_err(|e| GatewayError::SignatureInvalid(e.to_string()))?;
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }

        Err(GatewayError::SignatureInvalid(
            "no matching v1 signature".into(),
        ))
    }
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

fn parse_event(payload: &[u8]) -> Result<WebhookEvent, GatewayError> {
    let raw: RawEvent =
        serde_json::from_slice(payload).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let event = match raw.event_type.as_str() {
        "checkout.session.completed" => {
            let object: CheckoutSessionObject = serde_json::from_value(raw.data.object)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?;
            WebhookEvent::CheckoutSessionCompleted(object)
        }
        "payment_intent.payment_failed" => {
            let object: PaymentIntentObject = serde_json::from_value(raw.data.object)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?;
            WebhookEvent::PaymentFailed(object)
        }
        "charge.refunded" => {
            let object: ChargeObject = serde_json::from_value(raw.data.object)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?;
            WebhookEvent::ChargeRefunded(object)
        }
        _ => WebhookEvent::Ignored {
            event_type: raw.event_type,
        },
    };

    Ok(event)
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            (
                "success_url".into(),
                format!("{}?session_id={{CHECKOUT_SESSION_ID}}", request.success_url),
            ),
            ("cancel_url".into(), request.cancel_url),
            ("customer_email".into(), request.customer_email),
        ];

        for (i, line) in request.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                CURRENCY.into(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                line.name.clone(),
            ));
            if let Some(description) = &line.description {
                form.push((
                    format!("line_items[{i}][price_data][product_data][description]"),
                    description.clone(),
                ));
            }
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                line.unit_amount.to_string(),
            ));
            form.push((format!("line_items[{i}][quantity]"), line.quantity.to_string()));
        }

        // Metadata rides on both the session and the payment intent so every
        // webhook event type can find its way back to the order.
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
            form.push((
                format!("payment_intent_data[metadata][{key}]"),
                value.clone(),
            ));
        }

        let response = self
            .http
            .post(format!("{API_BASE}/checkout/sessions"))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Request(format!(
                "checkout session creation failed: {status}: {body}"
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let url = session
            .url
            .ok_or_else(|| GatewayError::Malformed("session has no redirect url".into()))?;

        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    fn construct_webhook_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, GatewayError> {
        self.verify_signature(payload, signature)?;
        parse_event(payload)
    }
}
