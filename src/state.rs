use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::gateway::{PaymentGateway, StripeGateway};
use crate::services::{CheckoutService, ReservationService, WebhookReconciler};
use crate::utils::clock::{Clock, SystemClock};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationService,
    pub checkout: CheckoutService,
    pub webhooks: WebhookReconciler,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Production wiring: system clock, real Stripe gateway.
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeGateway::new(
            config.stripe_secret_key.clone(),
            config.stripe_webhook_secret.clone(),
            clock.clone(),
        ));
        Self::with_parts(pool, clock, gateway, config.frontend_url.clone())
    }

    /// Explicit wiring, used by tests to inject a manual clock and a mock
    /// gateway.
    pub fn with_parts(
        pool: PgPool,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PaymentGateway>,
        frontend_url: String,
    ) -> Self {
        let reservations = ReservationService::new(pool.clone(), clock.clone());
        let checkout = CheckoutService::new(
            pool.clone(),
            clock.clone(),
            reservations.clone(),
            gateway.clone(),
            frontend_url,
        );
        let webhooks = WebhookReconciler::new(pool, clock);

        Self {
            reservations,
            checkout,
            webhooks,
            gateway,
        }
    }
}
