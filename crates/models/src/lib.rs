pub mod calendar;
pub mod error;
pub mod purchase;
pub mod records;
pub mod ticket;

pub use calendar::{Closure, closure_reason, is_open};
pub use error::{PurchaseError, UnknownTier};
pub use purchase::{MAX_TICKETS, Notifier, PaymentCollaborator, PaymentMethod, Purchase, PurchaseSummary};
pub use records::{PURCHASED_AT_FORMAT, VISIT_DATE_FORMAT, PurchaseDetail, PurchaseRecord, TicketRecord, User};
pub use ticket::{Ticket, TicketTier};
