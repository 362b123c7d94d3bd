use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calendar;
use crate::error::PurchaseError;
use crate::ticket::Ticket;

pub const MAX_TICKETS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "EFECTIVO")]
    Cash,
    #[serde(rename = "TARJETA")]
    Card,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Cash, PaymentMethod::Card];

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "EFECTIVO",
            PaymentMethod::Card => "TARJETA",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PurchaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or(PurchaseError::InvalidPaymentMethod)
    }
}

/// Charges a card purchase. Only called for [`PaymentMethod::Card`].
pub trait PaymentCollaborator {
    fn start_payment(&mut self, purchase: &Purchase) -> anyhow::Result<()>;
}

/// Tells the visitor their purchase went through.
pub trait Notifier {
    fn send_confirmation(&mut self, purchase: &Purchase) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PurchaseSummary {
    pub ticket_count: usize,
    pub visit_date: NaiveDate,
}

/// A ticket order for one visit date.
///
/// Built per request, then validated, priced and finalized. A `Purchase`
/// is never modified once built.
#[derive(Debug, Clone)]
pub struct Purchase {
    visit_date: NaiveDate,
    tickets: Vec<Ticket>,
    payment_method: PaymentMethod,
    created_at: DateTime<Local>,
}

impl Purchase {
    pub fn new(visit_date: NaiveDate, tickets: Vec<Ticket>, payment_method: PaymentMethod) -> Self {
        Self {
            visit_date,
            tickets,
            payment_method,
            created_at: Local::now(),
        }
    }

    /// Rebuilds a purchase that was created earlier, keeping its timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Local>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn visit_date(&self) -> NaiveDate {
        self.visit_date
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Checks the business rules against today's local date.
    pub fn validate(&self) -> Result<(), PurchaseError> {
        self.validate_on(Local::now().date_naive())
    }

    /// Checks the business rules in order: date, ticket limit, empty
    /// order, operating calendar. The first failing rule wins.
    ///
    /// An unrecognised payment method cannot be represented by
    /// [`PaymentMethod`]; it is rejected with
    /// [`PurchaseError::InvalidPaymentMethod`] when parsed.
    pub fn validate_on(&self, today: NaiveDate) -> Result<(), PurchaseError> {
        if self.visit_date < today {
            return Err(PurchaseError::PastDate);
        }
        if self.tickets.len() > MAX_TICKETS {
            return Err(PurchaseError::TooManyTickets);
        }
        if self.tickets.is_empty() {
            return Err(PurchaseError::NoTickets);
        }
        if let Some(reason) = calendar::closure_reason(self.visit_date) {
            debug!(visit_date = %self.visit_date, ?reason, "Park closed on requested date");
            return Err(PurchaseError::ParkClosed);
        }
        Ok(())
    }

    pub fn total(&self) -> i64 {
        self.tickets.iter().map(Ticket::price).sum()
    }

    /// Runs the card payment (card purchases only), then the confirmation.
    ///
    /// A payment failure aborts before anything is sent to the notifier.
    pub fn finalize<P, N>(&self, payment: &mut P, notifier: &mut N) -> anyhow::Result<PurchaseSummary>
    where
        P: PaymentCollaborator + ?Sized,
        N: Notifier + ?Sized,
    {
        if self.payment_method == PaymentMethod::Card {
            payment.start_payment(self)?;
        }
        notifier.send_confirmation(self)?;

        Ok(PurchaseSummary {
            ticket_count: self.tickets.len(),
            visit_date: self.visit_date,
        })
    }
}
