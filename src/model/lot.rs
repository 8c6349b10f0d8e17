use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::OptionType;
use super::transaction::InstrumentType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    Open,
    Partial,
    Closed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Open => "OPEN",
            LotStatus::Partial => "PARTIAL",
            LotStatus::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for LotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(LotStatus::Open),
            "PARTIAL" => Ok(LotStatus::Partial),
            "CLOSED" => Ok(LotStatus::Closed),
            other => Err(format!("unknown lot status `{other}`")),
        }
    }
}

/// What kind of event closed (part of) a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosingType {
    Manual,
    Expiration,
    Assignment,
    Exercise,
}

impl ClosingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClosingType::Manual => "MANUAL",
            ClosingType::Expiration => "EXPIRATION",
            ClosingType::Assignment => "ASSIGNMENT",
            ClosingType::Exercise => "EXERCISE",
        }
    }
}

impl std::str::FromStr for ClosingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MANUAL" => Ok(ClosingType::Manual),
            "EXPIRATION" => Ok(ClosingType::Expiration),
            "ASSIGNMENT" => Ok(ClosingType::Assignment),
            "EXERCISE" => Ok(ClosingType::Exercise),
            other => Err(format!("unknown closing type `{other}`")),
        }
    }
}

/// How a derived stock lot came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DerivationType {
    Assignment,
    Exercise,
}

impl DerivationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivationType::Assignment => "ASSIGNMENT",
            DerivationType::Exercise => "EXERCISE",
        }
    }

    pub fn closing_type(&self) -> ClosingType {
        match self {
            DerivationType::Assignment => ClosingType::Assignment,
            DerivationType::Exercise => ClosingType::Exercise,
        }
    }
}

impl std::str::FromStr for DerivationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSIGNMENT" => Ok(DerivationType::Assignment),
            "EXERCISE" => Ok(DerivationType::Exercise),
            other => Err(format!("unknown derivation type `{other}`")),
        }
    }
}

/// An open-position unit created by an opening transaction.
///
/// `quantity` is signed (positive long, negative short) and never changes;
/// `remaining_quantity` moves toward zero as closings land against the lot.
/// `original_quantity` is the absolute opened size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub id: i64,
    pub transaction_id: String,
    pub account_number: String,
    pub symbol: String,
    pub underlying: String,
    pub instrument_type: InstrumentType,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    pub expiration: Option<NaiveDate>,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_date: DateTime<Utc>,
    pub remaining_quantity: Decimal,
    pub original_quantity: Decimal,
    pub chain_id: Option<String>,
    pub leg_index: i64,
    pub opening_order_id: Option<String>,
    pub derived_from_lot_id: Option<i64>,
    pub derivation_type: Option<DerivationType>,
    pub status: LotStatus,
}

impl Lot {
    pub fn is_short(&self) -> bool {
        self.quantity < Decimal::ZERO
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    pub fn is_open(&self) -> bool {
        self.remaining_quantity != Decimal::ZERO && self.status != LotStatus::Closed
    }

    pub fn is_option(&self) -> bool {
        self.option_type.is_some()
    }

    /// Contract multiplier used everywhere cost basis or P&L is computed.
    pub fn multiplier(&self) -> Decimal {
        if self.is_option() {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ONE
        }
    }

    pub fn cost_basis(&self) -> Decimal {
        (self.entry_price * self.original_quantity * self.multiplier()).abs()
    }
}

/// One FIFO match event against a lot. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotClosing {
    pub closing_id: i64,
    pub lot_id: i64,
    pub closing_order_id: String,
    /// Null for synthetic closes (equity netting).
    pub closing_transaction_id: Option<String>,
    pub quantity_closed: Decimal,
    pub closing_price: Decimal,
    pub closing_date: DateTime<Utc>,
    pub closing_type: ClosingType,
    pub realized_pnl: Decimal,
    /// For assignment/exercise: the derived stock lot this close produced.
    pub resulting_lot_id: Option<i64>,
}
