use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Live,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seating_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SeatingType {
    GeneralAdmission,
    Seated,
}

/// Why an event currently refuses purchases. Surfaced verbatim to the client
/// so the UI can show the actual blocker instead of a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseBlockedReason {
    NotLive,
    RegistrationClosed,
    DeadlinePassed,
    SoldOut,
}

impl std::fmt::Display for PurchaseBlockedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PurchaseBlockedReason::NotLive => "not_live",
            PurchaseBlockedReason::RegistrationClosed => "registration_closed",
            PurchaseBlockedReason::DeadlinePassed => "deadline_passed",
            PurchaseBlockedReason::SoldOut => "sold_out",
        };
        f.write_str(s)
    }
}

/// Event configuration consumed read-only by the reservation and checkout
/// paths. The CRUD surface that manages these rows lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub status: EventStatus,
    pub seating_type: SeatingType,
    pub reservation_minutes: i32,
    pub price: Decimal,
    pub max_tickets: i32,
    pub tickets_sold: i32,
    pub registration_open: bool,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_seated(&self) -> bool {
        self.seating_type == SeatingType::Seated
    }

    pub fn can_purchase(&self, now: DateTime<Utc>) -> bool {
        self.purchase_blocked_reason(now).is_none()
    }

    /// Checks are ordered: liveness, registration flag, deadline, capacity.
    pub fn purchase_blocked_reason(&self, now: DateTime<Utc>) -> Option<PurchaseBlockedReason> {
        if self.status != EventStatus::Live {
            return Some(PurchaseBlockedReason::NotLive);
        }

        if !self.registration_open {
            return Some(PurchaseBlockedReason::RegistrationClosed);
        }

        if let Some(deadline) = self.registration_deadline {
            if now > deadline {
                return Some(PurchaseBlockedReason::DeadlinePassed);
            }
        }

        if self.tickets_sold >= self.max_tickets {
            return Some(PurchaseBlockedReason::SoldOut);
        }

        None
    }

    /// Remaining legacy general-admission capacity.
    pub fn tickets_available(&self) -> i32 {
        (self.max_tickets - self.tickets_sold).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn live_event(now: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            slug: "gala-2025".into(),
            name: "Gala 2025".into(),
            status: EventStatus::Live,
            seating_type: SeatingType::GeneralAdmission,
            reservation_minutes: 15,
            price: dec!(350.00),
            max_tickets: 100,
            tickets_sold: 0,
            registration_open: true,
            registration_deadline: Some(now + Duration::days(7)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn live_open_event_is_purchasable() {
        let now = Utc::now();
        assert!(live_event(now).can_purchase(now));
    }

    #[test]
    fn blocked_reasons_follow_check_order() {
        let now = Utc::now();

        let mut event = live_event(now);
        event.status = EventStatus::Draft;
        // not_live wins over every later check
        event.registration_open = false;
        assert_eq!(
            event.purchase_blocked_reason(now),
            Some(PurchaseBlockedReason::NotLive)
        );

        let mut event = live_event(now);
        event.registration_open = false;
        assert_eq!(
            event.purchase_blocked_reason(now),
            Some(PurchaseBlockedReason::RegistrationClosed)
        );

        let mut event = live_event(now);
        event.registration_deadline = Some(now - Duration::hours(1));
        assert_eq!(
            event.purchase_blocked_reason(now),
            Some(PurchaseBlockedReason::DeadlinePassed)
        );

        let mut event = live_event(now);
        event.tickets_sold = event.max_tickets;
        assert_eq!(
            event.purchase_blocked_reason(now),
            Some(PurchaseBlockedReason::SoldOut)
        );
    }

    #[test]
    fn tickets_available_never_negative() {
        let now = Utc::now();
        let mut event = live_event(now);
        event.tickets_sold = 120;
        assert_eq!(event.tickets_available(), 0);
    }
}
