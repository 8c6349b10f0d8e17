//! Stage 3 — the position ledger.
//!
//! Creates lots for opening transactions, FIFO-closes lots for closing
//! transactions, then runs the assignment/exercise post-pass that turns
//! matched stock rows into derived lots. Chain ids assigned here are
//! provisional; Stage 4 rewrites them from the derived graph.

use std::collections::BTreeSet;

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::context::Ctx;
use crate::model::symbol::underlying_of;
use crate::model::{
    Action, Chain, ClosingType, DerivationType, EventKind, InstrumentType, Order, OrderType,
    RawTransaction, Transaction,
};
use crate::pipeline::assemble::Assembly;
use crate::store::lots::{self, FifoClose, NewLot};

/// Run the full Stage-3 pass over assembled orders.
pub fn process_lots(conn: &Connection, ctx: &Ctx, assembly: &Assembly) -> Result<()> {
    create_and_close_lots(conn, ctx, &assembly.orders)?;
    process_assignments_and_exercises(conn, ctx, &assembly.orders, &assembly.assignment_stock_rows)
}

fn create_and_close_lots(conn: &Connection, ctx: &Ctx, orders: &[Order]) -> Result<()> {
    for order in orders {
        let mut temp_chain_id: Option<String> = None;

        if order.order_type == OrderType::Opening {
            temp_chain_id = Some(Chain::make_id(
                &order.underlying,
                order.executed_at,
                &order.order_id,
            ));
        }

        if matches!(order.order_type, OrderType::Closing | OrderType::Rolling) {
            // Capture which chains the closing legs touch before any lot is
            // consumed; rolling orders open their new lots into that chain.
            let mut affected: BTreeSet<String> = BTreeSet::new();
            for tx in order.closing_transactions() {
                for lot in lots::get_open_lots(conn, ctx, &tx.account_number, Some(&tx.symbol))? {
                    if let Some(chain_id) = lot.chain_id {
                        affected.insert(chain_id);
                    }
                }
            }
            if order.order_type == OrderType::Rolling {
                if let Some(chain_id) = affected.iter().next() {
                    temp_chain_id = Some(chain_id.clone());
                }
            }
        }

        for (idx, tx) in order.transactions.iter().enumerate() {
            if tx.is_opening() {
                create_lot_from_transaction(
                    conn,
                    ctx,
                    tx,
                    temp_chain_id.as_deref(),
                    idx as i64,
                    &order.order_id,
                )?;
            } else if tx.is_closing() {
                let closing_type = closing_type_of(tx);
                lots::close_lot_fifo(
                    conn,
                    ctx,
                    &FifoClose {
                        account_number: &tx.account_number,
                        symbol: &tx.symbol,
                        quantity_to_close: tx.quantity.abs(),
                        closing_price: tx.price,
                        closing_order_id: &order.order_id,
                        closing_transaction_id: Some(&tx.id),
                        closing_date: tx.executed_at,
                        closing_type,
                        close_long: tx.action.and_then(|a| a.close_long()),
                    },
                )?;
            }
        }
    }
    Ok(())
}

fn closing_type_of(tx: &Transaction) -> ClosingType {
    match tx.event() {
        EventKind::Assignment => ClosingType::Assignment,
        EventKind::Exercise => ClosingType::Exercise,
        EventKind::Expiration => ClosingType::Expiration,
        _ => ClosingType::Manual,
    }
}

fn create_lot_from_transaction(
    conn: &Connection,
    ctx: &Ctx,
    tx: &Transaction,
    chain_id: Option<&str>,
    leg_index: i64,
    opening_order_id: &str,
) -> Result<i64> {
    let quantity = match tx.action {
        Some(Action::SellToOpen) => -tx.quantity.abs(),
        _ => tx.quantity.abs(),
    };

    let id = lots::insert_lot(
        conn,
        ctx,
        &NewLot {
            transaction_id: &tx.id,
            account_number: &tx.account_number,
            symbol: &tx.symbol,
            underlying: &tx.underlying,
            instrument_type: tx.instrument_type,
            option_type: tx.option.map(|o| o.option_type),
            strike: tx.option.map(|o| o.strike),
            expiration: tx.option.map(|o| o.expiration),
            quantity,
            entry_price: tx.price,
            entry_date: tx.executed_at,
            chain_id,
            leg_index,
            opening_order_id: Some(opening_order_id),
            derived_from_lot_id: None,
            derivation_type: None,
        },
    )?;
    Ok(id)
}

// ── Assignment / exercise post-pass ──────────────────────────────────

fn process_assignments_and_exercises(
    conn: &Connection,
    ctx: &Ctx,
    orders: &[Order],
    assignment_stock_rows: &[RawTransaction],
) -> Result<()> {
    if assignment_stock_rows.is_empty() {
        return Ok(());
    }

    let mut remaining: Vec<RawTransaction> = assignment_stock_rows.to_vec();

    let assignment_txs: Vec<&Transaction> = orders
        .iter()
        .flat_map(|o| o.transactions.iter())
        .filter(|t| t.is_assignment() && t.option.is_some())
        .collect();

    if !assignment_txs.is_empty() {
        info!(
            assignments = assignment_txs.len(),
            stock_rows = remaining.len(),
            "matching assignments with stock transactions"
        );
    }

    for assignment_tx in assignment_txs {
        let Some(matched) = take_matching_stock(assignment_tx, &mut remaining) else {
            warn!(symbol = %assignment_tx.symbol, "no matching stock transaction for assignment");
            continue;
        };

        let Some((lot_id, chain_id, option_type, strike, _)) = lots::find_derivation_source(
            conn,
            ctx,
            &assignment_tx.account_number,
            &assignment_tx.symbol,
            ClosingType::Assignment,
        )?
        else {
            warn!(symbol = %assignment_tx.symbol, "no closed option lot found for assignment");
            continue;
        };

        let Some(chain_id) = chain_id else {
            warn!(lot_id, "option lot has no chain id; skipping derived lot");
            continue;
        };

        // A call assignment delivers shares out (short stock); a put
        // assignment receives shares (long stock).
        let raw_qty = matched.quantity.abs();
        let quantity = match option_type {
            Some(crate::model::OptionType::Call) => -raw_qty,
            _ => raw_qty,
        };
        let entry_price = strike.or(matched.price).unwrap_or_default();

        let derived_id = create_derived_stock_lot(
            conn,
            ctx,
            &matched,
            lot_id,
            DerivationType::Assignment,
            &chain_id,
            quantity,
            entry_price,
        )?;

        info!(derived_id, source = lot_id, "created derived stock lot via assignment");
    }

    // ── Exercises ──
    let exercise_txs: Vec<&Transaction> = orders
        .iter()
        .flat_map(|o| o.transactions.iter())
        .filter(|t| t.is_exercise() && t.option.is_some())
        .collect();

    if !exercise_txs.is_empty() && !remaining.is_empty() {
        info!(
            exercises = exercise_txs.len(),
            stock_rows = remaining.len(),
            "matching exercises with stock transactions"
        );
    }

    for exercise_tx in &exercise_txs {
        if remaining.is_empty() {
            break;
        }
        let Some(matched) = take_matching_stock(exercise_tx, &mut remaining) else {
            warn!(symbol = %exercise_tx.symbol, "no matching stock transaction for exercise");
            continue;
        };

        let Some((lot_id, chain_id, _, strike, closing_order_id)) = lots::find_derivation_source(
            conn,
            ctx,
            &exercise_tx.account_number,
            &exercise_tx.symbol,
            ClosingType::Exercise,
        )?
        else {
            warn!(symbol = %exercise_tx.symbol, "no closed option lot found for exercise");
            continue;
        };

        let stock_action = matched.action.as_deref().unwrap_or_default().to_uppercase();

        if stock_action.contains("TO_CLOSE") {
            // The exercise settles against existing shares.
            let close_long = stock_action.contains("SELL");
            let fallback_order_id = format!("EXERCISE_{}", exercise_tx.symbol);
            let symbol = matched.symbol.as_deref().unwrap_or(&exercise_tx.underlying);
            let outcome = lots::close_lot_fifo(
                conn,
                ctx,
                &FifoClose {
                    account_number: &matched.account_number,
                    symbol,
                    quantity_to_close: matched.quantity.abs(),
                    closing_price: matched.price.unwrap_or_default(),
                    closing_order_id: if closing_order_id.is_empty() {
                        &fallback_order_id
                    } else {
                        &closing_order_id
                    },
                    closing_transaction_id: Some(&matched.id),
                    closing_date: matched.executed_at,
                    closing_type: ClosingType::Exercise,
                    close_long: Some(close_long),
                },
            )?;

            info!(
                lots_closed = outcome.lot_ids.len(),
                pnl = %outcome.realized_pnl,
                symbol = %exercise_tx.symbol,
                "exercise closed stock lots"
            );

            if let Some(&first) = outcome.lot_ids.first() {
                lots::link_resulting_lot(conn, ctx, lot_id, ClosingType::Exercise, first)?;
            }
        } else if stock_action.contains("TO_OPEN") {
            let raw_qty = matched.quantity.abs();
            let quantity = if stock_action.contains("SELL") {
                -raw_qty
            } else {
                raw_qty
            };
            let entry_price = strike.or(matched.price).unwrap_or_default();
            let chain_id = chain_id.unwrap_or_default();

            let derived_id = create_derived_stock_lot(
                conn,
                ctx,
                &matched,
                lot_id,
                DerivationType::Exercise,
                &chain_id,
                quantity,
                entry_price,
            )?;

            info!(derived_id, source = lot_id, "created derived stock lot via exercise");
        } else {
            warn!(action = %stock_action, "unexpected stock action for exercise");
        }
    }

    // ── Receive-Deliver opens ──
    // ACAT receipts and other Receive-Deliver rows open plain equity lots.
    // Their closing side is already represented by assignment-derived lots,
    // so only opening actions are processed here.
    for row in &remaining {
        let action = row.action.as_deref().unwrap_or_default().to_uppercase();
        if row.is_receive_deliver() && action.contains("TO_OPEN") {
            let symbol = row.symbol.as_deref().unwrap_or_default();
            let underlying = row
                .underlying_symbol
                .as_deref()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| underlying_of(symbol));
            let quantity = if action.contains("SELL") {
                -row.quantity.abs()
            } else {
                row.quantity.abs()
            };

            lots::insert_lot(
                conn,
                ctx,
                &NewLot {
                    transaction_id: &row.id,
                    account_number: &row.account_number,
                    symbol,
                    underlying,
                    instrument_type: InstrumentType::Equity,
                    option_type: None,
                    strike: None,
                    expiration: None,
                    quantity,
                    entry_price: row.price.unwrap_or_default(),
                    entry_date: row.executed_at,
                    chain_id: None,
                    leg_index: 0,
                    opening_order_id: None,
                    derived_from_lot_id: None,
                    derivation_type: None,
                },
            )?;
        } else {
            warn!(id = %row.id, symbol = ?row.symbol, "unmatched stock transaction left alone");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn create_derived_stock_lot(
    conn: &Connection,
    ctx: &Ctx,
    stock: &RawTransaction,
    source_lot_id: i64,
    derivation_type: DerivationType,
    chain_id: &str,
    quantity: Decimal,
    entry_price: Decimal,
) -> Result<i64> {
    let symbol = stock.symbol.as_deref().unwrap_or_default();
    let underlying = stock
        .underlying_symbol
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| underlying_of(symbol));

    let derived_id = lots::insert_lot(
        conn,
        ctx,
        &NewLot {
            transaction_id: &stock.id,
            account_number: &stock.account_number,
            symbol,
            underlying,
            instrument_type: InstrumentType::Equity,
            option_type: None,
            strike: None,
            expiration: None,
            quantity,
            entry_price,
            entry_date: stock.executed_at,
            chain_id: if chain_id.is_empty() { None } else { Some(chain_id) },
            leg_index: 0,
            opening_order_id: None,
            derived_from_lot_id: Some(source_lot_id),
            derivation_type: Some(derivation_type),
        },
    )?;

    lots::link_resulting_lot(
        conn,
        ctx,
        source_lot_id,
        derivation_type.closing_type(),
        derived_id,
    )?;
    Ok(derived_id)
}

/// Find (and remove) the stock row matching an assignment/exercise option
/// transaction: same underlying, executed within 60 seconds, and share
/// quantity exactly `contracts × 100`.
fn take_matching_stock(
    option_tx: &Transaction,
    stock_rows: &mut Vec<RawTransaction>,
) -> Option<RawTransaction> {
    let expected_shares = option_tx.quantity.abs() * Decimal::ONE_HUNDRED;

    let idx = stock_rows.iter().position(|stock| {
        let stock_underlying = stock
            .underlying_symbol
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(stock.symbol.as_deref())
            .unwrap_or_default();
        if stock_underlying != option_tx.underlying {
            return false;
        }

        let diff = (option_tx.executed_at - stock.executed_at).num_seconds().abs();
        if diff > 60 {
            return false;
        }

        stock.quantity.abs() == expected_shares
    })?;

    Some(stock_rows.remove(idx))
}
