pub mod event;
pub mod event_item;
pub mod order;
pub mod order_item;
pub mod reservation;
pub mod seat;
pub mod table;
pub mod ticket_tier;

pub use event::{Event, EventStatus, PurchaseBlockedReason, SeatingType};
pub use event_item::EventItem;
pub use order::{Order, OrderStatus};
pub use order_item::{LineItemRef, OrderItem, OrderItemType};
pub use reservation::{SeatReservation, TableReservation};
pub use seat::Seat;
pub use table::{Table, UnitStatus};
pub use ticket_tier::TicketTier;
