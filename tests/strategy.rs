//! Recognizer coverage: registry round-trips, dispatch ordering, and the
//! lots→legs adapter.

mod common;

use chrono::NaiveDate;
use common::dec;

use trade_ledger::model::{InstrumentType, Lot, LotStatus, OptionType};
use trade_ledger::strategy::types::{Direction, Leg, LegInstrument};
use trade_ledger::strategy::{lots_to_legs, recognize};

fn exp(days: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, days).unwrap()
}

fn option_leg(
    option_type: OptionType,
    strike: &str,
    expiration: NaiveDate,
    direction: Direction,
    quantity: &str,
) -> Leg {
    Leg {
        instrument: LegInstrument::Option,
        option_type: Some(option_type),
        strike: Some(dec(strike)),
        expiration: Some(expiration),
        direction,
        quantity: dec(quantity),
    }
}

fn equity_leg(direction: Direction, quantity: &str) -> Leg {
    Leg {
        instrument: LegInstrument::Equity,
        option_type: None,
        strike: None,
        expiration: None,
        direction,
        quantity: dec(quantity),
    }
}

fn assert_recognized(legs: &[Leg], expected: &str) {
    let result = recognize(legs);
    assert_eq!(result.name, expected);
    assert_eq!(result.confidence, 1.0, "{expected} should be a registry match");
}

// ── Combos ───────────────────────────────────────────────────────────

#[test]
fn covered_call() {
    assert_recognized(
        &[
            equity_leg(Direction::Long, "100"),
            option_leg(OptionType::Call, "180", exp(21), Direction::Short, "1"),
        ],
        "Covered Call",
    );
}

#[test]
fn covered_call_requires_full_share_coverage() {
    let result = recognize(&[
        equity_leg(Direction::Long, "99"),
        option_leg(OptionType::Call, "180", exp(21), Direction::Short, "1"),
    ]);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.name, "Custom (2-leg)");
}

#[test]
fn collar() {
    assert_recognized(
        &[
            equity_leg(Direction::Long, "100"),
            option_leg(OptionType::Call, "190", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Put, "160", exp(21), Direction::Long, "1"),
        ],
        "Collar",
    );
}

#[test]
fn cash_secured_put_wins_over_short_put() {
    // A bare short put dispatches to the combo tier before singletons.
    assert_recognized(
        &[option_leg(OptionType::Put, "170", exp(21), Direction::Short, "1")],
        "Cash Secured Put",
    );
}

#[test]
fn jade_lizard() {
    assert_recognized(
        &[
            option_leg(OptionType::Put, "160", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "185", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "190", exp(21), Direction::Long, "1"),
        ],
        "Jade Lizard",
    );
}

// ── Same-expiration multi-leg ────────────────────────────────────────

#[test]
fn iron_condor() {
    assert_recognized(
        &[
            option_leg(OptionType::Put, "160", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Put, "170", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "190", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "200", exp(21), Direction::Long, "1"),
        ],
        "Iron Condor",
    );
}

#[test]
fn iron_butterfly_shares_body_strike() {
    assert_recognized(
        &[
            option_leg(OptionType::Put, "160", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Put, "175", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "175", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "190", exp(21), Direction::Long, "1"),
        ],
        "Iron Butterfly",
    );
}

#[test]
fn straddles_and_strangles() {
    assert_recognized(
        &[
            option_leg(OptionType::Put, "175", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "175", exp(21), Direction::Short, "1"),
        ],
        "Short Straddle",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Put, "175", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Call, "175", exp(21), Direction::Long, "1"),
        ],
        "Long Straddle",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Put, "165", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "185", exp(21), Direction::Short, "1"),
        ],
        "Short Strangle",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Put, "165", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Call, "185", exp(21), Direction::Long, "1"),
        ],
        "Long Strangle",
    );
}

// ── Cross-expiration ─────────────────────────────────────────────────

#[test]
fn calendar_diagonal_pmcc() {
    assert_recognized(
        &[
            option_leg(OptionType::Call, "170", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "170", exp(28), Direction::Long, "1"),
        ],
        "Calendar Spread",
    );
    // Long far-dated call below a short near-term call.
    assert_recognized(
        &[
            option_leg(OptionType::Call, "150", exp(28), Direction::Long, "1"),
            option_leg(OptionType::Call, "180", exp(21), Direction::Short, "1"),
        ],
        "PMCC",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Put, "150", exp(28), Direction::Long, "1"),
            option_leg(OptionType::Put, "180", exp(21), Direction::Short, "1"),
        ],
        "Diagonal Spread",
    );
}

// ── Verticals ────────────────────────────────────────────────────────

#[test]
fn vertical_spreads() {
    assert_recognized(
        &[
            option_leg(OptionType::Put, "160", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Put, "170", exp(21), Direction::Short, "1"),
        ],
        "Bull Put Spread",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Put, "160", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Put, "170", exp(21), Direction::Long, "1"),
        ],
        "Bear Put Spread",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Call, "160", exp(21), Direction::Long, "1"),
            option_leg(OptionType::Call, "170", exp(21), Direction::Short, "1"),
        ],
        "Bull Call Spread",
    );
    assert_recognized(
        &[
            option_leg(OptionType::Call, "160", exp(21), Direction::Short, "1"),
            option_leg(OptionType::Call, "170", exp(21), Direction::Long, "1"),
        ],
        "Bear Call Spread",
    );
}

// ── Singletons and fallback ──────────────────────────────────────────

#[test]
fn singletons() {
    assert_recognized(
        &[option_leg(OptionType::Call, "170", exp(21), Direction::Long, "1")],
        "Long Call",
    );
    assert_recognized(
        &[option_leg(OptionType::Call, "170", exp(21), Direction::Short, "1")],
        "Short Call",
    );
    assert_recognized(
        &[option_leg(OptionType::Put, "170", exp(21), Direction::Long, "1")],
        "Long Put",
    );
    assert_recognized(&[equity_leg(Direction::Long, "100")], "Shares");
}

#[test]
fn unmatched_shapes_fall_back_to_custom() {
    let result = recognize(&[
        option_leg(OptionType::Call, "170", exp(21), Direction::Long, "1"),
        option_leg(OptionType::Call, "180", exp(21), Direction::Long, "1"),
        option_leg(OptionType::Call, "190", exp(21), Direction::Long, "1"),
    ]);
    assert_eq!(result.name, "Custom (3-leg)");
    assert_eq!(result.confidence, 0.0);

    let empty = recognize(&[]);
    assert_eq!(empty.name, "Custom (0-leg)");
}

// ── Adapter ──────────────────────────────────────────────────────────

fn make_lot(
    id: i64,
    option_type: Option<OptionType>,
    strike: Option<&str>,
    quantity: &str,
    remaining: &str,
    status: LotStatus,
) -> Lot {
    Lot {
        id,
        transaction_id: format!("tx-{id}"),
        account_number: "ACCT1".to_string(),
        symbol: "AAPL".to_string(),
        underlying: "AAPL".to_string(),
        instrument_type: if option_type.is_some() {
            InstrumentType::EquityOption
        } else {
            InstrumentType::Equity
        },
        option_type,
        strike: strike.map(dec),
        expiration: option_type.map(|_| exp(21)),
        quantity: dec(quantity),
        entry_price: dec("1.00"),
        entry_date: common::dt("2025-03-01T10:00:00+00:00"),
        remaining_quantity: dec(remaining),
        original_quantity: dec(quantity).abs(),
        chain_id: None,
        leg_index: 0,
        opening_order_id: Some("ORD-1".to_string()),
        derived_from_lot_id: None,
        derivation_type: None,
        status,
    }
}

#[test]
fn adapter_groups_open_lots_by_structure() {
    let lots = vec![
        make_lot(1, Some(OptionType::Put), Some("170"), "-1", "-1", LotStatus::Open),
        make_lot(2, Some(OptionType::Put), Some("170"), "-2", "-2", LotStatus::Open),
        make_lot(3, Some(OptionType::Put), Some("170"), "-1", "0", LotStatus::Closed),
    ];

    let legs = lots_to_legs(&lots);
    assert_eq!(legs.len(), 1);
    assert_eq!(legs[0].quantity, dec("3"));
    assert_eq!(legs[0].direction, Direction::Short);
}

#[test]
fn adapter_falls_back_to_as_opened_legs_when_everything_is_closed() {
    let lots = vec![
        make_lot(1, Some(OptionType::Put), Some("160"), "1", "0", LotStatus::Closed),
        make_lot(2, Some(OptionType::Put), Some("170"), "-1", "0", LotStatus::Closed),
        make_lot(3, Some(OptionType::Call), Some("190"), "-1", "0", LotStatus::Closed),
        make_lot(4, Some(OptionType::Call), Some("200"), "1", "0", LotStatus::Closed),
    ];

    let legs = lots_to_legs(&lots);
    assert_eq!(legs.len(), 4);
    assert_eq!(recognize(&legs).name, "Iron Condor");
}

#[test]
fn partial_lot_contributes_remaining_quantity() {
    let lots = vec![make_lot(1, Some(OptionType::Put), Some("170"), "-4", "-2", LotStatus::Partial)];
    let legs = lots_to_legs(&lots);
    assert_eq!(legs[0].quantity, dec("2"));
}
