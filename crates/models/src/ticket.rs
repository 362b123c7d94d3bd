use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::UnknownTier;

/// Pass tier. The wire and database name is the upper-case variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketTier {
    Regular,
    Vip,
}

impl TicketTier {
    pub const ALL: [TicketTier; 2] = [TicketTier::Regular, TicketTier::Vip];

    /// Unit price in whole currency units.
    pub const fn price(self) -> i64 {
        match self {
            TicketTier::Regular => 5000,
            TicketTier::Vip => 10000,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TicketTier::Regular => "REGULAR",
            TicketTier::Vip => "VIP",
        }
    }
}

impl fmt::Display for TicketTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

/// One admission for one visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    age: u32,
    tier: TicketTier,
}

impl Ticket {
    pub fn new(age: u32, tier: TicketTier) -> Self {
        Self { age, tier }
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn tier(&self) -> TicketTier {
        self.tier
    }

    pub fn price(&self) -> i64 {
        self.tier.price()
    }
}
