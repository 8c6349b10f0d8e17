//! Stage-2 unit coverage: filtering, normalization, classification,
//! symbol-change pairing.

mod common;

use common::{dec, option_tx, stock_trade_tx, system_option_tx, system_stock_tx};

use trade_ledger::model::{Action, OrderType};
use trade_ledger::pipeline::assemble;

#[test]
fn rows_without_symbol_are_dropped() {
    let mut tx = option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
        "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00");
    tx.symbol = None;

    let assembly = assemble(&[tx]);
    assert!(assembly.orders.is_empty());
    assert!(assembly.assignment_stock_rows.is_empty());
}

#[test]
fn rows_without_action_or_system_sub_type_are_dropped() {
    let mut tx = option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
        "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00");
    tx.action = None;
    tx.transaction_sub_type = Some("Dividend".to_string());

    let assembly = assemble(&[tx]);
    assert!(assembly.orders.is_empty());
}

#[test]
fn assignment_stock_rows_are_separated_not_ordered() {
    let stock = system_stock_tx("tx-stock", "BUY_TO_OPEN", "100", "170.00", "AAPL",
        "2025-03-21T16:00:00+00:00", "Receive Deliver");

    let assembly = assemble(&[stock]);
    assert!(assembly.orders.is_empty());
    assert_eq!(assembly.assignment_stock_rows.len(), 1);
    assert_eq!(assembly.assignment_stock_rows[0].id, "tx-stock");
}

#[test]
fn identical_fills_aggregate_quantity_and_join_ids() {
    let raw = vec![
        option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "2", "1.50",
            "AAPL  250321C00170000", "2025-03-01T10:00:05+00:00"),
        option_tx("tx-2", "ORD-1", "BUY_TO_OPEN", "3", "1.50",
            "AAPL  250321C00170000", "2025-03-01T10:00:01+00:00"),
    ];

    let assembly = assemble(&raw);
    assert_eq!(assembly.orders.len(), 1);
    let order = &assembly.orders[0];
    assert_eq!(order.transactions.len(), 1);

    let merged = &order.transactions[0];
    assert_eq!(merged.quantity, dec("5"));
    assert_eq!(merged.id, "tx-1,tx-2");
    // The aggregate keeps the earliest fill time.
    assert_eq!(merged.executed_at, common::dt("2025-03-01T10:00:01+00:00"));
}

#[test]
fn different_price_fills_stay_separate() {
    let raw = vec![
        option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "2", "1.50",
            "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-2", "ORD-1", "BUY_TO_OPEN", "3", "1.55",
            "AAPL  250321C00170000", "2025-03-01T10:00:01+00:00"),
    ];

    let assembly = assemble(&raw);
    assert_eq!(assembly.orders[0].transactions.len(), 2);
}

#[test]
fn order_classification() {
    let opening = assemble(&[option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
        "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00")]);
    assert_eq!(opening.orders[0].order_type, OrderType::Opening);

    let closing = assemble(&[option_tx("tx-1", "ORD-1", "SELL_TO_CLOSE", "1", "1.00",
        "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00")]);
    assert_eq!(closing.orders[0].order_type, OrderType::Closing);

    let rolling = assemble(&[
        option_tx("tx-1", "ORD-1", "BUY_TO_CLOSE", "1", "1.00",
            "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-2", "ORD-1", "SELL_TO_OPEN", "1", "1.50",
            "AAPL  250418C00170000", "2025-03-01T10:00:00+00:00"),
    ]);
    assert_eq!(rolling.orders[0].order_type, OrderType::Rolling);
}

#[test]
fn expiration_becomes_closing_order_with_synthetic_id() {
    let assembly = assemble(&[system_option_tx("tx-exp", "Expiration", "1",
        "AAPL  250321C00170000", "2025-03-21T16:00:00+00:00")]);

    assert_eq!(assembly.orders.len(), 1);
    let order = &assembly.orders[0];
    assert_eq!(order.order_type, OrderType::Closing);
    assert!(order.order_id.starts_with("SYSTEM_Expiration_"));
    assert!(!order.order_id.contains(' '));
    assert!(!order.order_id.contains(':'));
}

#[test]
fn orders_sort_chronologically() {
    let raw = vec![
        option_tx("tx-2", "ORD-2", "SELL_TO_CLOSE", "1", "2.00",
            "AAPL  250321C00170000", "2025-03-10T10:00:00+00:00"),
        option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
            "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00"),
    ];

    let assembly = assemble(&raw);
    let ids: Vec<&str> = assembly.orders.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids, vec!["ORD-1", "ORD-2"]);
}

#[test]
fn option_symbols_parse_into_contract_terms() {
    let assembly = assemble(&[option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
        "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00")]);

    let tx = &assembly.orders[0].transactions[0];
    let option = tx.option.expect("parsed option terms");
    assert_eq!(option.strike, dec("170"));
    assert_eq!(option.option_type, trade_ledger::model::OptionType::Call);
    assert_eq!(tx.action, Some(Action::BuyToOpen));
}

#[test]
fn unparseable_option_symbol_leaves_fields_null() {
    let assembly = assemble(&[option_tx("tx-1", "ORD-1", "BUY_TO_OPEN", "1", "1.00",
        "WEIRD-SYMBOL", "2025-03-01T10:00:00+00:00")]);

    assert_eq!(assembly.orders.len(), 1);
    assert!(assembly.orders[0].transactions[0].option.is_none());
}

#[test]
fn symbol_change_legs_share_paired_order_ids() {
    let mut close_leg = stock_trade_tx("tx-close", "IGNORED", "SELL_TO_CLOSE", "100", "0.00",
        "OLDCO", "2025-03-05T09:00:00+00:00");
    close_leg.order_id = None;
    close_leg.transaction_sub_type = Some("Symbol Change".to_string());

    let mut open_leg = stock_trade_tx("tx-open", "IGNORED", "BUY_TO_OPEN", "100", "0.00",
        "NEWCO", "2025-03-05T09:00:00+00:00");
    open_leg.order_id = None;
    open_leg.transaction_sub_type = Some("Symbol Change".to_string());
    // The broker reports both legs under the old underlying.
    open_leg.underlying_symbol = Some("OLDCO".to_string());

    let assembly = assemble(&[close_leg, open_leg]);
    assert_eq!(assembly.orders.len(), 2);

    let close_order = assembly
        .orders
        .iter()
        .find(|o| o.order_id.starts_with("SYMCHG_CLOSE_"))
        .expect("close-side order");
    let open_order = assembly
        .orders
        .iter()
        .find(|o| o.order_id.starts_with("SYMCHG_OPEN_"))
        .expect("open-side order");

    assert_eq!(close_order.order_id, "SYMCHG_CLOSE_ACCT1_OLDCO_2025-03-05");
    assert_eq!(open_order.order_id, "SYMCHG_OPEN_ACCT1_NEWCO_2025-03-05");
    assert_eq!(close_order.underlying, "OLDCO");
    assert_eq!(open_order.underlying, "NEWCO");
}
