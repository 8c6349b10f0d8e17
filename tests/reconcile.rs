//! Broker-snapshot reconciliation: category classification and stale
//! auto-closing.

mod common;

use common::{ctx, dec, option_tx, reprocess_all, test_db};

use trade_ledger::model::{GroupStatus, LotStatus};
use trade_ledger::reconcile::{BrokerPosition, reconcile_positions};
use trade_ledger::store::{groups, lots};

fn broker(symbol: &str, quantity: &str) -> BrokerPosition {
    BrokerPosition {
        account_number: "ACCT1".to_string(),
        symbol: symbol.to_string(),
        underlying: Some(symbol.split_whitespace().next().unwrap_or(symbol).to_string()),
        instrument_type: None,
        quantity: dec(quantity),
    }
}

fn open_short_put_db() -> rusqlite::Connection {
    let mut conn = test_db();
    let raw = vec![option_tx("tx-open", "ORD-1", "SELL_TO_OPEN", "2", "2.00",
        "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00")];
    reprocess_all(&mut conn, &raw);
    conn
}

#[test]
fn matched_positions_count() {
    let conn = open_short_put_db();
    let snapshot = vec![broker("AAPL  250321P00170000", "-2")];

    let summary = reconcile_positions(&conn, &ctx(), &snapshot).unwrap();
    assert_eq!(summary.matched, 1);
    assert!(summary.quantity_mismatch.is_empty());
    assert!(summary.unlinked.is_empty());
    assert!(summary.stale.is_empty());
}

#[test]
fn quantity_mismatch_is_reported() {
    let conn = open_short_put_db();
    let snapshot = vec![broker("AAPL  250321P00170000", "-1")];

    let summary = reconcile_positions(&conn, &ctx(), &snapshot).unwrap();
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.quantity_mismatch.len(), 1);
    let mismatch = &summary.quantity_mismatch[0];
    assert_eq!(mismatch.broker_quantity, dec("-1"));
    assert_eq!(mismatch.ledger_quantity, dec("-2"));
}

#[test]
fn broker_only_position_is_unlinked() {
    let conn = test_db();
    let snapshot = vec![broker("TSLA", "100")];

    let summary = reconcile_positions(&conn, &ctx(), &snapshot).unwrap();
    assert_eq!(summary.unlinked.len(), 1);
    assert_eq!(summary.unlinked[0].symbol, "TSLA");
}

#[test]
fn ledger_only_position_is_auto_closed() {
    let conn = open_short_put_db();

    // Broker no longer holds the put.
    let summary = reconcile_positions(&conn, &ctx(), &[]).unwrap();
    assert_eq!(summary.auto_closed_groups.len(), 1);
    // Resolved stale entries drop out of the report.
    assert!(summary.stale.is_empty());

    let ctx = ctx();
    let all_lots = lots::get_all_lots(&conn, &ctx).unwrap();
    assert!(all_lots.iter().all(|l| l.status == LotStatus::Closed));

    let group = groups::get_group(&conn, &ctx, &summary.auto_closed_groups[0])
        .unwrap()
        .unwrap();
    assert_eq!(group.status, GroupStatus::Closed);
}

#[test]
fn stale_group_with_matched_position_is_left_alone() {
    let mut conn = test_db();
    // Two AAPL puts in one group: one stays at the broker, one vanished.
    let raw = vec![
        option_tx("tx-a", "ORD-1", "SELL_TO_OPEN", "1", "2.00",
            "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-b", "ORD-1", "SELL_TO_OPEN", "1", "1.00",
            "AAPL  250321P00160000", "2025-03-01T10:00:00+00:00"),
    ];
    reprocess_all(&mut conn, &raw);

    let snapshot = vec![broker("AAPL  250321P00170000", "-1")];
    let summary = reconcile_positions(&conn, &ctx(), &snapshot).unwrap();

    // The 160 put is stale, but its group also matched on the 170 put.
    assert!(summary.auto_closed_groups.is_empty());
    assert_eq!(summary.stale.len(), 1);
    assert_eq!(summary.matched, 1);
}

#[test]
fn ghost_group_is_closed_when_broker_has_nothing() {
    let conn = open_short_put_db();
    let ctx = ctx();

    // Manually flatten the lot while leaving the group OPEN.
    conn.execute(
        "UPDATE position_lots SET remaining_quantity = '0', status = 'CLOSED'",
        [],
    )
    .unwrap();

    let summary = reconcile_positions(&conn, &ctx, &[]).unwrap();
    assert_eq!(summary.auto_closed_groups.len(), 1);

    let group = groups::get_group(&conn, &ctx, &summary.auto_closed_groups[0])
        .unwrap()
        .unwrap();
    assert_eq!(group.status, GroupStatus::Closed);
}
