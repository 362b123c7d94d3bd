//! Rows of the `usuarios`, `compras` and `entradas` tables.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::purchase::{PaymentMethod, Purchase};
use crate::ticket::{Ticket, TicketTier};

pub const VISIT_DATE_FORMAT: &str = "%Y-%m-%d";
pub const PURCHASED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub nombre: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PurchaseRecord {
    pub id: i64,
    pub id_usuario: i64,
    pub fecha_visita: String,
    pub fecha_compra: Option<String>,
    pub cantidad: i64,
    pub medio_pago: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TicketRecord {
    pub id: i64,
    pub id_compra: i64,
    pub edad: i64,
    pub tipo_entrada: String,
}

impl TicketRecord {
    /// Price of the stored tier; unknown tiers are worth nothing.
    pub fn price(&self) -> i64 {
        self.tipo_entrada
            .parse::<TicketTier>()
            .map(TicketTier::price)
            .unwrap_or(0)
    }
}

/// A stored purchase together with its buyer and tickets.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseDetail {
    pub purchase: PurchaseRecord,
    pub user: User,
    pub tickets: Vec<TicketRecord>,
}

impl PurchaseDetail {
    pub fn total(&self) -> i64 {
        self.tickets.iter().map(TicketRecord::price).sum()
    }

    /// Rebuilds the domain purchase from its rows.
    pub fn to_purchase(&self) -> Result<Purchase> {
        let visit_date = NaiveDate::parse_from_str(&self.purchase.fecha_visita, VISIT_DATE_FORMAT)
            .with_context(|| format!("Invalid visit date {:?}", self.purchase.fecha_visita))?;
        let payment_method: PaymentMethod = self.purchase.medio_pago.parse()?;

        let tickets = self
            .tickets
            .iter()
            .map(|t| -> Result<Ticket> {
                let tier: TicketTier = t.tipo_entrada.parse()?;
                let age = u32::try_from(t.edad)
                    .with_context(|| format!("Invalid age {} on ticket {}", t.edad, t.id))?;
                Ok(Ticket::new(age, tier))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut purchase = Purchase::new(visit_date, tickets, payment_method);
        if let Some(created) = self.purchase.fecha_compra.as_deref() {
            let naive = NaiveDateTime::parse_from_str(created, PURCHASED_AT_FORMAT)
                .with_context(|| format!("Invalid purchase timestamp {created:?}"))?;
            if let Some(local) = Local.from_local_datetime(&naive).earliest() {
                purchase = purchase.with_created_at(local);
            }
        }
        Ok(purchase)
    }
}
