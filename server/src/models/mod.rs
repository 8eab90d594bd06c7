pub mod actor;
pub mod event;
pub mod tier;
pub mod transaction;

pub use actor::{Actor, Role};
pub use event::{Event, EventStatus};
pub use tier::{TicketKind, TicketTier, TierAvailability, TierStatus};
pub use transaction::{PurchaseTransaction, TransactionStatus};
