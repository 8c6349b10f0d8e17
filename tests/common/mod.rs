//! Shared fixtures: in-memory DB and raw-transaction builders.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;

use trade_ledger::context::Ctx;
use trade_ledger::db;
use trade_ledger::model::RawTransaction;
use trade_ledger::pipeline::{self, PipelineResult};

pub const ACCOUNT: &str = "ACCT1";

pub fn test_db() -> Connection {
    let conn = db::open_in_memory().expect("in-memory db");
    let ctx = ctx();
    ctx.ensure_user(&conn).expect("seed user");
    conn
}

pub fn ctx() -> Ctx {
    Ctx::single_user()
}

pub fn dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("timestamp literal")
        .with_timezone(&Utc)
}

pub fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

fn underlying_of(symbol: &str) -> String {
    symbol.split_whitespace().next().unwrap_or(symbol).to_string()
}

/// An option fill (Trade).
pub fn option_tx(
    id: &str,
    order_id: &str,
    action: &str,
    quantity: &str,
    price: &str,
    symbol: &str,
    executed_at: &str,
) -> RawTransaction {
    RawTransaction {
        id: id.to_string(),
        account_number: ACCOUNT.to_string(),
        order_id: Some(order_id.to_string()),
        symbol: Some(symbol.to_string()),
        underlying_symbol: Some(underlying_of(symbol)),
        action: Some(action.to_string()),
        instrument_type: Some("Equity Option".to_string()),
        transaction_type: Some("Trade".to_string()),
        transaction_sub_type: None,
        quantity: dec(quantity),
        price: Some(dec(price)),
        executed_at: dt(executed_at),
        commission: Decimal::ZERO,
        regulatory_fees: Decimal::ZERO,
        clearing_fees: Decimal::ZERO,
        value: Decimal::ZERO,
        description: None,
    }
}

/// An equity fill with an order id (ordinary trade).
pub fn stock_trade_tx(
    id: &str,
    order_id: &str,
    action: &str,
    quantity: &str,
    price: &str,
    symbol: &str,
    executed_at: &str,
) -> RawTransaction {
    RawTransaction {
        id: id.to_string(),
        account_number: ACCOUNT.to_string(),
        order_id: Some(order_id.to_string()),
        symbol: Some(symbol.to_string()),
        underlying_symbol: Some(underlying_of(symbol)),
        action: Some(action.to_string()),
        instrument_type: Some("Equity".to_string()),
        transaction_type: Some("Trade".to_string()),
        transaction_sub_type: None,
        quantity: dec(quantity),
        price: Some(dec(price)),
        executed_at: dt(executed_at),
        commission: Decimal::ZERO,
        regulatory_fees: Decimal::ZERO,
        clearing_fees: Decimal::ZERO,
        value: Decimal::ZERO,
        description: None,
    }
}

/// The stock side of an assignment/exercise, or an ACAT receipt: an equity
/// row with an action but no order id.
pub fn system_stock_tx(
    id: &str,
    action: &str,
    quantity: &str,
    price: &str,
    symbol: &str,
    executed_at: &str,
    transaction_type: &str,
) -> RawTransaction {
    RawTransaction {
        id: id.to_string(),
        account_number: ACCOUNT.to_string(),
        order_id: None,
        symbol: Some(symbol.to_string()),
        underlying_symbol: Some(underlying_of(symbol)),
        action: Some(action.to_string()),
        instrument_type: Some("Equity".to_string()),
        transaction_type: Some(transaction_type.to_string()),
        transaction_sub_type: None,
        quantity: dec(quantity),
        price: Some(dec(price)),
        executed_at: dt(executed_at),
        commission: Decimal::ZERO,
        regulatory_fees: Decimal::ZERO,
        clearing_fees: Decimal::ZERO,
        value: Decimal::ZERO,
        description: None,
    }
}

/// A system option event (expiration/assignment/exercise): no order id, no
/// action, flagged by sub-type.
pub fn system_option_tx(
    id: &str,
    sub_type: &str,
    quantity: &str,
    symbol: &str,
    executed_at: &str,
) -> RawTransaction {
    RawTransaction {
        id: id.to_string(),
        account_number: ACCOUNT.to_string(),
        order_id: None,
        symbol: Some(symbol.to_string()),
        underlying_symbol: Some(underlying_of(symbol)),
        action: None,
        instrument_type: Some("Equity Option".to_string()),
        transaction_type: Some("Receive Deliver".to_string()),
        transaction_sub_type: Some(sub_type.to_string()),
        quantity: dec(quantity),
        price: Some(Decimal::ZERO),
        executed_at: dt(executed_at),
        commission: Decimal::ZERO,
        regulatory_fees: Decimal::ZERO,
        clearing_fees: Decimal::ZERO,
        value: Decimal::ZERO,
        description: None,
    }
}

pub fn reprocess_all(conn: &mut Connection, raw: &[RawTransaction]) -> PipelineResult {
    pipeline::reprocess(conn, &ctx(), raw, None).expect("pipeline run")
}
