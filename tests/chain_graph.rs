//! Graph soundness: connected components, chain ids, and edge handling.

mod common;

use common::{ctx, option_tx, reprocess_all, test_db};

use trade_ledger::pipeline::chain_graph::build_order_graph;
use trade_ledger::store::lots;

#[test]
fn components_union_over_shared_orders() {
    let lot_edges = vec![
        ("A".to_string(), "B".to_string()),
        ("B".to_string(), "C".to_string()),
        ("X".to_string(), "Y".to_string()),
    ];
    let components = build_order_graph(&lot_edges, &[]);

    assert_eq!(components.len(), 2);
    let abc = components
        .values()
        .find(|c| c.contains("A"))
        .expect("component containing A");
    assert!(abc.contains("B") && abc.contains("C"));
    let xy = components
        .values()
        .find(|c| c.contains("X"))
        .expect("component containing X");
    assert_eq!(xy.len(), 2);
}

#[test]
fn derived_edges_bridge_into_parent_component() {
    let lot_edges = vec![("OPEN".to_string(), "ASSIGN".to_string())];
    let derived_edges = vec![("ASSIGN".to_string(), "OPEN".to_string())];
    let components = build_order_graph(&lot_edges, &derived_edges);
    assert_eq!(components.len(), 1);
}

#[test]
fn every_closing_edge_lands_in_one_component() {
    let mut conn = test_db();
    let raw = vec![
        option_tx("tx-open", "ORD-1", "SELL_TO_OPEN", "2", "2.00",
            "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-close-a", "ORD-2", "BUY_TO_CLOSE", "1", "1.50",
            "AAPL  250321P00170000", "2025-03-05T10:00:00+00:00"),
        option_tx("tx-close-b", "ORD-3", "BUY_TO_CLOSE", "1", "1.00",
            "AAPL  250321P00170000", "2025-03-08T10:00:00+00:00"),
    ];

    reprocess_all(&mut conn, &raw);

    let ctx = ctx();
    let all_lots = lots::get_all_lots(&conn, &ctx).unwrap();
    let all_closings = lots::get_all_closings(&conn, &ctx).unwrap();

    // Both closing orders joined the opening order's chain.
    let chain_ids: std::collections::HashSet<_> =
        all_lots.iter().filter_map(|l| l.chain_id.clone()).collect();
    assert_eq!(chain_ids.len(), 1);
    assert_eq!(all_closings.len(), 2);

    let summaries =
        trade_ledger::store::chains::get_chain_summaries(&conn, &ctx, None, None).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].order_count, 3);
}

#[test]
fn chain_id_is_derived_from_earliest_order() {
    let mut conn = test_db();
    let raw = vec![
        option_tx("tx-open", "ORDER-ABCDEFGH", "SELL_TO_OPEN", "1", "2.00",
            "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-close", "ORD-CLOSE", "BUY_TO_CLOSE", "1", "1.00",
            "AAPL  250321P00170000", "2025-03-10T10:00:00+00:00"),
    ];

    reprocess_all(&mut conn, &raw);

    let summaries =
        trade_ledger::store::chains::get_chain_summaries(&conn, &ctx(), None, None).unwrap();
    assert_eq!(summaries[0].chain_id, "AAPL_OPENING_20250301_ORDER-AB");
}

#[test]
fn unrelated_positions_make_separate_chains() {
    let mut conn = test_db();
    let raw = vec![
        option_tx("tx-1", "ORD-1", "SELL_TO_OPEN", "1", "2.00",
            "AAPL  250321P00170000", "2025-03-01T10:00:00+00:00"),
        option_tx("tx-2", "ORD-2", "SELL_TO_OPEN", "1", "3.00",
            "MSFT  250321P00400000", "2025-03-01T11:00:00+00:00"),
    ];

    let result = reprocess_all(&mut conn, &raw);
    assert_eq!(result.chains_derived, 2);
}
