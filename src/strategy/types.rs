use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::OptionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegInstrument {
    Equity,
    Option,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// A single leg of a strategy: the structural summary of one or more lots
/// sharing `(instrument, option type, strike, expiration, direction)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub instrument: LegInstrument,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    pub expiration: Option<NaiveDate>,
    pub direction: Direction,
    /// Always positive.
    pub quantity: Decimal,
}

impl Leg {
    pub fn is_option(&self) -> bool {
        self.instrument == LegInstrument::Option
    }

    pub fn is_call(&self) -> bool {
        self.option_type == Some(OptionType::Call)
    }

    pub fn is_put(&self) -> bool {
        self.option_type == Some(OptionType::Put)
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }
}

/// Market bias of a recognized strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditDebit {
    Credit,
    Debit,
    Mixed,
}

/// Registry entry describing a named strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDef {
    pub name: &'static str,
    pub direction: Option<Bias>,
    pub credit_debit: Option<CreditDebit>,
    pub leg_count: u8,
}

/// Result of strategy recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub name: String,
    pub direction: Option<Bias>,
    pub credit_debit: Option<CreditDebit>,
    pub leg_count: u8,
    /// 1.0 for a registry match, 0.0 for the `Custom (N-leg)` fallback.
    pub confidence: f64,
}
