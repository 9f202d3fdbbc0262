pub mod checkout;
pub mod reservation;
pub mod webhook;

pub use checkout::{CheckoutRequest, CheckoutResponse, CheckoutService};
pub use reservation::{ReservationHold, ReservationService, ReservedUnits};
pub use webhook::WebhookReconciler;
