//! Card payment simulator modelled on a hosted-checkout sandbox.
//!
//! Card numbers are checked for format and Luhn checksum, then classified
//! deterministically from fixed sandbox test-card lists. Nothing leaves the
//! process.

use chrono::{DateTime, Datelike, Local, NaiveDate};
use ecopark_models::{PaymentCollaborator, Purchase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const APPROVED_CARDS: [&str; 3] = [
    "4509953566233704", // Visa
    "5031433215406351", // Mastercard
    "3711803032594270", // Amex
];

pub const REJECTED_CARDS: [&str; 2] = [
    "4111111111111111", // insufficient funds
    "5555555555554444", // expired
];

pub const PENDING_CARDS: [&str; 1] = [
    "4000000000000002", // needs manual authorization
];

const PAYMENT_METHOD: &str = "credit_card";

// --- Card data ---

/// Wire names of the fields a checkout form must submit.
pub const CARD_FIELDS: [&str; 6] = [
    "numero_tarjeta",
    "cvv",
    "vencimiento_mes",
    "vencimiento_anio",
    "titular",
    "monto",
];

/// Card details as submitted by the checkout form.
#[derive(Debug, Clone, Deserialize)]
pub struct CardData {
    #[serde(rename = "numero_tarjeta")]
    pub number: String,
    pub cvv: String,
    #[serde(rename = "vencimiento_mes")]
    pub expiry_month: String,
    #[serde(rename = "vencimiento_anio")]
    pub expiry_year: String,
    #[serde(rename = "titular")]
    pub holder: String,
    #[serde(rename = "monto")]
    pub amount: i64,
}

/// True for 13-19 ASCII digits passing the Luhn checksum.
pub fn is_valid_card_number(number: &str) -> bool {
    if !(13..=19).contains(&number.len()) || !number.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    luhn_checksum(number) % 10 == 0
}

fn luhn_checksum(digits: &str) -> u32 {
    digits
        .bytes()
        .rev()
        .map(|b| u32::from(b - b'0'))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                doubled / 10 + doubled % 10
            } else {
                d
            }
        })
        .sum()
}

pub fn is_valid_cvv(cvv: &str) -> bool {
    matches!(cvv.len(), 3 | 4) && cvv.bytes().all(|b| b.is_ascii_digit())
}

/// Month must be 1-12; two-digit years mean 20xx. A card expiring this
/// month is still accepted.
pub fn is_unexpired(month: &str, year: &str, today: NaiveDate) -> bool {
    let (Ok(month), Ok(mut year)) = (month.trim().parse::<u32>(), year.trim().parse::<i32>()) else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }
    if year < 100 {
        year += 2000;
    }
    (year, month) >= (today.year(), today.month())
}

// --- Outcomes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Rejected,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidCardNumber,
    InvalidCvv,
    Expired,
    InsufficientFunds,
}

impl RejectReason {
    pub fn detail(self) -> &'static str {
        match self {
            RejectReason::InvalidCardNumber => "número_de_tarjeta_inválido",
            RejectReason::InvalidCvv => "cvv_inválido",
            RejectReason::Expired => "tarjeta_vencida",
            RejectReason::InsufficientFunds => "fondos_insuficientes",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RejectReason::InvalidCardNumber => "Número de tarjeta inválido",
            RejectReason::InvalidCvv => "CVV inválido",
            RejectReason::Expired => "Tarjeta vencida",
            RejectReason::InsufficientFunds => "Fondos insuficientes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentOutcome {
    pub transaction_id: String,
    pub status: PaymentStatus,
    pub status_detail: String,
    pub payment_method: &'static str,
    #[serde(rename = "monto")]
    pub amount: i64,
    #[serde(rename = "fecha")]
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl PaymentOutcome {
    fn new(status: PaymentStatus, detail: &str, amount: i64, message: String) -> Self {
        Self {
            transaction_id: new_id("TXN"),
            status,
            status_detail: detail.to_string(),
            payment_method: PAYMENT_METHOD,
            amount,
            timestamp: Local::now(),
            message,
        }
    }

    fn approved(amount: i64) -> Self {
        Self::new(PaymentStatus::Approved, "accredited", amount, "Pago aprobado exitosamente".to_string())
    }

    fn pending(amount: i64) -> Self {
        Self::new(
            PaymentStatus::Pending,
            "pending_authorization",
            amount,
            "Pago pendiente de autorización".to_string(),
        )
    }

    fn rejected(reason: RejectReason, amount: i64) -> Self {
        Self::new(
            PaymentStatus::Rejected,
            reason.detail(),
            amount,
            format!("Pago rechazado: {}", reason.description()),
        )
    }
}

/// `PREFIX-` followed by 16 upper-case hex digits.
fn new_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", hex[..16].to_uppercase())
}

/// Sandbox outcome of a card that already passed validation.
pub fn classify(number: &str) -> PaymentStatus {
    if APPROVED_CARDS.contains(&number) {
        PaymentStatus::Approved
    } else if REJECTED_CARDS.contains(&number) {
        PaymentStatus::Rejected
    } else if PENDING_CARDS.contains(&number) {
        PaymentStatus::Pending
    } else {
        PaymentStatus::Approved
    }
}

// --- Checkout preferences ---

/// A checkout session opened before redirecting a card payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutPreference {
    pub preference_id: String,
    pub amount: i64,
    pub description: String,
}

impl CheckoutPreference {
    pub fn checkout_url(&self, purchase_id: i64) -> String {
        format!(
            "/pago-mercadopago?preference_id={}&compra_id={purchase_id}",
            self.preference_id
        )
    }
}

// --- Simulator ---

#[derive(Debug, Default)]
pub struct PaymentSimulator {
    transactions: Vec<PaymentOutcome>,
    checkout: Option<CheckoutPreference>,
}

impl PaymentSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_preference(&mut self, amount: i64, description: impl Into<String>) -> CheckoutPreference {
        let preference = CheckoutPreference {
            preference_id: new_id("PREF"),
            amount,
            description: description.into(),
        };
        debug!(preference_id = %preference.preference_id, amount, "Checkout preference created");
        self.checkout = Some(preference.clone());
        preference
    }

    /// The last preference created, i.e. the checkout the payer is being
    /// redirected to.
    pub fn pending_checkout(&self) -> Option<&CheckoutPreference> {
        self.checkout.as_ref()
    }

    pub fn process_payment(&mut self, card: &CardData) -> PaymentOutcome {
        self.process_payment_on(card, Local::now().date_naive())
    }

    /// Validates the card as of `today` and records the outcome.
    pub fn process_payment_on(&mut self, card: &CardData, today: NaiveDate) -> PaymentOutcome {
        let number: String = card.number.chars().filter(|c| *c != ' ').collect();

        let outcome = if !is_valid_card_number(&number) {
            PaymentOutcome::rejected(RejectReason::InvalidCardNumber, card.amount)
        } else if !is_valid_cvv(&card.cvv) {
            PaymentOutcome::rejected(RejectReason::InvalidCvv, card.amount)
        } else if !is_unexpired(&card.expiry_month, &card.expiry_year, today) {
            PaymentOutcome::rejected(RejectReason::Expired, card.amount)
        } else {
            match classify(&number) {
                PaymentStatus::Approved => PaymentOutcome::approved(card.amount),
                PaymentStatus::Pending => PaymentOutcome::pending(card.amount),
                PaymentStatus::Rejected => {
                    PaymentOutcome::rejected(RejectReason::InsufficientFunds, card.amount)
                }
            }
        };

        info!(
            transaction_id = %outcome.transaction_id,
            status = ?outcome.status,
            detail = %outcome.status_detail,
            amount = outcome.amount,
            "Card payment processed"
        );
        self.transactions.push(outcome.clone());
        outcome
    }

    pub fn transaction(&self, transaction_id: &str) -> Option<&PaymentOutcome> {
        self.transactions.iter().find(|t| t.transaction_id == transaction_id)
    }

    pub fn transactions(&self) -> &[PaymentOutcome] {
        &self.transactions
    }
}

/// Card purchases open a checkout preference for their total; the payer
/// completes it on the checkout page.
impl PaymentCollaborator for PaymentSimulator {
    fn start_payment(&mut self, purchase: &Purchase) -> anyhow::Result<()> {
        let count = purchase.tickets().len();
        self.create_preference(
            purchase.total(),
            format!("Entradas Parque Temático - {count} entrada(s)"),
        );
        Ok(())
    }
}
