use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::transaction::Transaction;

/// How an order relates to the positions it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Opening,
    Rolling,
    Closing,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Opening => "OPENING",
            OrderType::Rolling => "ROLLING",
            OrderType::Closing => "CLOSING",
        }
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPENING" => Ok(OrderType::Opening),
            "ROLLING" => Ok(OrderType::Rolling),
            "CLOSING" => Ok(OrderType::Closing),
            other => Err(format!("unknown order type `{other}`")),
        }
    }
}

/// A group of transactions sharing `(account, underlying, order_id)` after
/// normalization. Orders live in memory through Stages 2-4; the chain cache
/// is their persisted projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub account_number: String,
    pub underlying: String,
    pub executed_at: DateTime<Utc>,
    pub order_type: OrderType,
    pub transactions: Vec<Transaction>,
}

impl Order {
    pub fn closing_transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.is_closing())
    }
}
