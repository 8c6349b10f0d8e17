//! FIFO mechanics and derived-lot handling at the store level.

mod common;

use common::{ctx, dec, dt, option_tx, stock_trade_tx, system_option_tx, system_stock_tx, test_db};
use rust_decimal::Decimal;

use trade_ledger::model::{ClosingType, DerivationType, InstrumentType, LotStatus};
use trade_ledger::store::lots::{self, FifoClose, NewLot};

fn plain_lot<'a>(transaction_id: &'a str, quantity: &'a str, price: &'a str, date: &'a str) -> NewLot<'a> {
    NewLot {
        transaction_id,
        account_number: "ACCT1",
        symbol: "AAPL",
        underlying: "AAPL",
        instrument_type: InstrumentType::Equity,
        option_type: None,
        strike: None,
        expiration: None,
        quantity: dec(quantity),
        entry_price: dec(price),
        entry_date: dt(date),
        chain_id: None,
        leg_index: 0,
        opening_order_id: Some("ORD-1"),
        derived_from_lot_id: None,
        derivation_type: None,
    }
}

#[test]
fn fifo_consumes_oldest_lots_first() {
    let conn = test_db();
    let ctx = ctx();

    let first = lots::insert_lot(&conn, &ctx, &plain_lot("tx-1", "100", "150",
        "2025-03-01T10:00:00+00:00")).unwrap();
    let second = lots::insert_lot(&conn, &ctx, &plain_lot("tx-2", "100", "155",
        "2025-03-05T10:00:00+00:00")).unwrap();

    let outcome = lots::close_lot_fifo(&conn, &ctx, &FifoClose {
        account_number: "ACCT1",
        symbol: "AAPL",
        quantity_to_close: dec("150"),
        closing_price: dec("160"),
        closing_order_id: "ORD-CLOSE",
        closing_transaction_id: Some("tx-close"),
        closing_date: dt("2025-03-10T10:00:00+00:00"),
        closing_type: ClosingType::Manual,
        close_long: Some(true),
    }).unwrap();

    // (160-150)*100 + (160-155)*50
    assert_eq!(outcome.realized_pnl, dec("1250"));
    assert_eq!(outcome.quantity_closed, dec("150"));
    assert_eq!(outcome.lot_ids, vec![first, second]);

    let first_lot = lots::get_lot(&conn, &ctx, first).unwrap().unwrap();
    assert_eq!(first_lot.status, LotStatus::Closed);
    let second_lot = lots::get_lot(&conn, &ctx, second).unwrap().unwrap();
    assert_eq!(second_lot.status, LotStatus::Partial);
    assert_eq!(second_lot.remaining_quantity, dec("50"));
}

#[test]
fn close_against_empty_inventory_records_nothing() {
    let conn = test_db();
    let ctx = ctx();

    let outcome = lots::close_lot_fifo(&conn, &ctx, &FifoClose {
        account_number: "ACCT1",
        symbol: "AAPL",
        quantity_to_close: dec("10"),
        closing_price: dec("160"),
        closing_order_id: "ORD-CLOSE",
        closing_transaction_id: Some("tx-close"),
        closing_date: dt("2025-03-10T10:00:00+00:00"),
        closing_type: ClosingType::Manual,
        close_long: None,
    }).unwrap();

    assert_eq!(outcome.realized_pnl, Decimal::ZERO);
    assert!(outcome.lot_ids.is_empty());
    assert!(lots::get_all_closings(&conn, &ctx).unwrap().is_empty());
}

#[test]
fn direction_filter_selects_matching_side_only() {
    let conn = test_db();
    let ctx = ctx();

    let long_id = lots::insert_lot(&conn, &ctx, &plain_lot("tx-long", "100", "150",
        "2025-03-01T10:00:00+00:00")).unwrap();
    let short_id = lots::insert_lot(&conn, &ctx, &plain_lot("tx-short", "-100", "155",
        "2025-03-02T10:00:00+00:00")).unwrap();

    // BTC: short lots only.
    let outcome = lots::close_lot_fifo(&conn, &ctx, &FifoClose {
        account_number: "ACCT1",
        symbol: "AAPL",
        quantity_to_close: dec("100"),
        closing_price: dec("150"),
        closing_order_id: "ORD-BTC",
        closing_transaction_id: Some("tx-btc"),
        closing_date: dt("2025-03-10T10:00:00+00:00"),
        closing_type: ClosingType::Manual,
        close_long: Some(false),
    }).unwrap();

    assert_eq!(outcome.lot_ids, vec![short_id]);
    // Short lot: (155-150)*100
    assert_eq!(outcome.realized_pnl, dec("500"));

    let long_lot = lots::get_lot(&conn, &ctx, long_id).unwrap().unwrap();
    assert_eq!(long_lot.status, LotStatus::Open);
    assert_eq!(long_lot.remaining_quantity, dec("100"));
}

#[test]
fn short_pnl_sign_is_entry_minus_close() {
    let conn = test_db();
    let ctx = ctx();

    lots::insert_lot(&conn, &ctx, &plain_lot("tx-short", "-100", "150",
        "2025-03-01T10:00:00+00:00")).unwrap();

    let outcome = lots::close_lot_fifo(&conn, &ctx, &FifoClose {
        account_number: "ACCT1",
        symbol: "AAPL",
        quantity_to_close: dec("100"),
        closing_price: dec("160"),
        closing_order_id: "ORD-BTC",
        closing_transaction_id: Some("tx-btc"),
        closing_date: dt("2025-03-10T10:00:00+00:00"),
        closing_type: ClosingType::Manual,
        close_long: Some(false),
    }).unwrap();

    // Bought back higher: a loss.
    assert_eq!(outcome.realized_pnl, dec("-1000"));
}

// ── Exercises ────────────────────────────────────────────────────────

#[test]
fn long_call_exercise_opens_derived_shares_at_strike() {
    let mut conn = test_db();
    let raw = vec![
        option_tx("tx-bto", "ORD-BTO", "BUY_TO_OPEN", "1", "3.00",
            "AAPL  250321C00170000", "2025-03-01T10:00:00+00:00"),
        system_option_tx("tx-ex", "Exercise", "1",
            "AAPL  250321C00170000", "2025-03-21T16:00:00+00:00"),
        system_stock_tx("tx-stock", "BUY_TO_OPEN", "100", "170.00", "AAPL",
            "2025-03-21T16:00:10+00:00", "Receive Deliver"),
    ];

    common::reprocess_all(&mut conn, &raw);

    let ctx = ctx();
    let all = lots::get_all_lots(&conn, &ctx).unwrap();
    let stock = all.iter().find(|l| !l.is_option()).unwrap();
    assert_eq!(stock.quantity, dec("100"));
    assert_eq!(stock.entry_price, dec("170"));
    assert_eq!(stock.derivation_type, Some(DerivationType::Exercise));

    let option_lot = all.iter().find(|l| l.is_option()).unwrap();
    let closings = lots::get_closings_for_lot(&conn, &ctx, option_lot.id).unwrap();
    assert_eq!(closings[0].closing_type, ClosingType::Exercise);
    assert_eq!(closings[0].resulting_lot_id, Some(stock.id));
}

#[test]
fn long_put_exercise_closes_existing_shares() {
    let mut conn = test_db();
    let raw = vec![
        // Own 100 shares at 180.
        stock_trade_tx("tx-shares", "ORD-SHARES", "BUY_TO_OPEN", "100", "180.00",
            "AAPL", "2025-02-01T10:00:00+00:00"),
        // Long put, exercised: shares sold at the strike.
        option_tx("tx-bto", "ORD-BTO", "BUY_TO_OPEN", "1", "5.00",
            "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00"),
        system_option_tx("tx-ex", "Exercise", "1",
            "AAPL  250321P00170000", "2025-03-21T16:00:00+00:00"),
        system_stock_tx("tx-stock", "SELL_TO_CLOSE", "100", "170.00", "AAPL",
            "2025-03-21T16:00:10+00:00", "Receive Deliver"),
    ];

    common::reprocess_all(&mut conn, &raw);

    let ctx = ctx();
    let all = lots::get_all_lots(&conn, &ctx).unwrap();
    let shares = all.iter().find(|l| !l.is_option()).unwrap();
    assert_eq!(shares.status, LotStatus::Closed);

    let closings = lots::get_closings_for_lot(&conn, &ctx, shares.id).unwrap();
    assert_eq!(closings.len(), 1);
    assert_eq!(closings[0].closing_type, ClosingType::Exercise);
    // Sold at 170 against a 180 basis.
    assert_eq!(closings[0].realized_pnl, dec("-1000.00"));

    // No derived stock lot: the exercise consumed existing shares.
    assert_eq!(all.iter().filter(|l| !l.is_option()).count(), 1);
}

#[test]
fn receive_deliver_open_creates_plain_equity_lot() {
    let mut conn = test_db();
    let raw = vec![system_stock_tx("tx-acat", "BUY_TO_OPEN", "250", "42.00", "PLTR",
        "2025-03-01T10:00:00+00:00", "Receive Deliver")];

    common::reprocess_all(&mut conn, &raw);

    let ctx = ctx();
    let all = lots::get_all_lots(&conn, &ctx).unwrap();
    assert_eq!(all.len(), 1);
    let lot = &all[0];
    assert_eq!(lot.quantity, dec("250"));
    assert_eq!(lot.entry_price, dec("42.00"));
    assert!(lot.chain_id.is_none());
    assert!(lot.derived_from_lot_id.is_none());
}
