use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::symbol::OptionDetails;

/// A broker-native transaction row, persisted verbatim by Stage 1.
///
/// Field names match the broker's JSON payload. Rows are immutable once
/// ingested; uniqueness is `(id, user_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Broker-unique transaction id.
    pub id: String,
    pub account_number: String,
    /// Absent for system events (expiration, assignment, ACAT stock legs).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying_symbol: Option<String>,
    /// One of the open/close verbs, or null for pure system events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    /// Flags Expiration, Assignment, Exercise, Symbol Change, Receive Deliver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_sub_type: Option<String>,
    /// Signed fill quantity (contracts or shares).
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
    #[serde(default)]
    pub commission: Decimal,
    #[serde(default)]
    pub regulatory_fees: Decimal,
    #[serde(default)]
    pub clearing_fees: Decimal,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RawTransaction {
    pub fn sub_type_upper(&self) -> String {
        self.transaction_sub_type
            .as_deref()
            .unwrap_or_default()
            .to_uppercase()
    }

    pub fn is_symbol_change(&self) -> bool {
        self.transaction_sub_type.as_deref() == Some("Symbol Change")
    }

    pub fn is_receive_deliver(&self) -> bool {
        self.transaction_type
            .as_deref()
            .is_some_and(|t| t.contains("Receive Deliver"))
    }

    pub fn is_equity(&self) -> bool {
        let it = self.instrument_type.as_deref().unwrap_or_default();
        it.to_uppercase().contains("EQUITY") && !it.to_uppercase().contains("OPTION")
    }
}

/// The six open/close verbs the broker reports on trading rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    BuyToOpen,
    SellToOpen,
    BuyToClose,
    SellToClose,
    Buy,
    Sell,
}

impl Action {
    /// Parse from a broker action string (tolerates enum-style prefixes like
    /// `OrderAction.BUY_TO_OPEN`).
    pub fn parse(raw: &str) -> Option<Action> {
        let upper = raw.to_uppercase();
        if upper.contains("BUY_TO_OPEN") {
            Some(Action::BuyToOpen)
        } else if upper.contains("SELL_TO_OPEN") {
            Some(Action::SellToOpen)
        } else if upper.contains("BUY_TO_CLOSE") {
            Some(Action::BuyToClose)
        } else if upper.contains("SELL_TO_CLOSE") {
            Some(Action::SellToClose)
        } else if upper.contains("BUY") {
            Some(Action::Buy)
        } else if upper.contains("SELL") {
            Some(Action::Sell)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::BuyToOpen => "BUY_TO_OPEN",
            Action::SellToOpen => "SELL_TO_OPEN",
            Action::BuyToClose => "BUY_TO_CLOSE",
            Action::SellToClose => "SELL_TO_CLOSE",
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Action::BuyToOpen | Action::SellToOpen)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Action::BuyToClose | Action::SellToClose)
    }

    /// FIFO direction filter: an STC matches long lots only, a BTC short
    /// lots only. Other verbs are unconstrained.
    pub fn close_long(&self) -> Option<bool> {
        match self {
            Action::SellToClose => Some(true),
            Action::BuyToClose => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentType {
    Equity,
    EquityOption,
}

impl InstrumentType {
    pub fn parse(raw: &str) -> InstrumentType {
        if raw.to_uppercase().contains("OPTION") {
            InstrumentType::EquityOption
        } else {
            InstrumentType::Equity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Equity => "EQUITY",
            InstrumentType::EquityOption => "EQUITY_OPTION",
        }
    }
}

impl std::str::FromStr for InstrumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EQUITY" => Ok(InstrumentType::Equity),
            "EQUITY_OPTION" => Ok(InstrumentType::EquityOption),
            other => Err(format!("unknown instrument type `{other}`")),
        }
    }
}

/// What a transaction *means* to the ledger, collapsing the action verb and
/// the sub-type flags into one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Open,
    Close,
    Expiration,
    Assignment,
    Exercise,
    SymbolChange,
}

/// A typed trading transaction, produced by Stage 2 from a raw row.
///
/// Unlike [`RawTransaction`], every field the pipeline needs is resolved:
/// the action verb is an enum, option details are parsed from the symbol,
/// and system events carry a synthetic order id.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub account_number: String,
    pub order_id: String,
    pub symbol: String,
    pub underlying: String,
    pub action: Option<Action>,
    pub quantity: Decimal,
    pub price: Decimal,
    pub executed_at: DateTime<Utc>,
    pub transaction_type: String,
    pub sub_type: String,
    pub instrument_type: InstrumentType,
    pub option: Option<OptionDetails>,
    pub commission: Decimal,
    pub regulatory_fees: Decimal,
    pub clearing_fees: Decimal,
    pub value: Decimal,
}

impl Transaction {
    pub fn is_opening(&self) -> bool {
        self.action.is_some_and(|a| a.is_open())
    }

    pub fn is_closing(&self) -> bool {
        self.action.is_some_and(|a| a.is_close())
            || self.is_expiration()
            || self.is_assignment()
            || self.is_exercise()
    }

    pub fn is_expiration(&self) -> bool {
        self.sub_type.to_uppercase().contains("EXPIR")
    }

    pub fn is_assignment(&self) -> bool {
        self.sub_type.to_uppercase().contains("ASSIGNMENT")
    }

    pub fn is_exercise(&self) -> bool {
        self.sub_type.to_uppercase().contains("EXERCISE")
    }

    pub fn event(&self) -> EventKind {
        if self.sub_type == "Symbol Change" {
            EventKind::SymbolChange
        } else if self.is_assignment() {
            EventKind::Assignment
        } else if self.is_exercise() {
            EventKind::Exercise
        } else if self.is_expiration() {
            EventKind::Expiration
        } else if self.is_opening() {
            EventKind::Open
        } else {
            EventKind::Close
        }
    }
}
