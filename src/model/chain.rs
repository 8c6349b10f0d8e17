use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::Order;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainStatus {
    Open,
    Closed,
    Assigned,
}

impl ChainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainStatus::Open => "OPEN",
            ChainStatus::Closed => "CLOSED",
            ChainStatus::Assigned => "ASSIGNED",
        }
    }
}

impl std::str::FromStr for ChainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(ChainStatus::Open),
            "CLOSED" => Ok(ChainStatus::Closed),
            "ASSIGNED" => Ok(ChainStatus::Assigned),
            other => Err(format!("unknown chain status `{other}`")),
        }
    }
}

/// A connected component of orders tied together by lot/closing edges.
///
/// Chains are recomputed on every pipeline run; the `order_chains` table is
/// a cache of this in-memory result, not a source of truth.
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    pub chain_id: String,
    pub account_number: String,
    pub underlying: String,
    /// Chronologically ordered.
    pub orders: Vec<Order>,
    pub status: ChainStatus,
}

impl Chain {
    /// Deterministic id derived from the earliest order of the component.
    pub fn make_id(underlying: &str, executed_at: chrono::DateTime<chrono::Utc>, order_id: &str) -> String {
        let short: String = order_id.chars().take(8).collect();
        format!(
            "{}_OPENING_{}_{}",
            underlying,
            executed_at.format("%Y%m%d"),
            short
        )
    }

    pub fn opening_date(&self) -> Option<NaiveDate> {
        self.orders.first().map(|o| o.executed_at.date_naive())
    }

    pub fn closing_date(&self) -> Option<NaiveDate> {
        if self.status == ChainStatus::Closed {
            self.orders.last().map(|o| o.executed_at.date_naive())
        } else {
            None
        }
    }
}

/// Cached chain rollup served to the chains view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub chain_id: String,
    pub account_number: String,
    pub underlying: String,
    pub strategy_type: Option<String>,
    pub status: ChainStatus,
    pub order_count: i64,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub opening_date: Option<NaiveDate>,
    pub closing_date: Option<NaiveDate>,
}
