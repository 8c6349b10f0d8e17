//! Chain cache persistence: `order_chains` rollups plus per-order JSON in
//! `order_chain_cache` for cheap UI reads.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::info;

use crate::context::Ctx;
use crate::model::{Chain, ChainSummary, ChainStatus, Lot, Order};
use crate::store::{lots, opt_date_value, parse_enum, sql_placeholders};
use crate::strategy;

/// Replace the cached chain rollups with a fresh derivation result.
///
/// With `affected_underlyings` set, only those underlyings' cache rows are
/// cleared and rewritten (incremental mode); otherwise the whole user cache
/// is rebuilt.
pub fn update_chain_cache(
    conn: &Connection,
    ctx: &Ctx,
    chains: &[Chain],
    affected_underlyings: Option<&[String]>,
) -> Result<()> {
    clear_cache(conn, ctx, affected_underlyings)?;

    for chain in chains {
        let chain_lots = lots::get_lots_for_chain(conn, ctx, &chain.chain_id, false)?;
        let strategy_type = detect_strategy(&chain_lots);

        let realized = lots::realized_pnl_for_chain(conn, ctx, &chain.chain_id)?;
        let all_lots = lots::get_lots_for_chain(conn, ctx, &chain.chain_id, true)?;
        let unrealized = open_premium(&all_lots);
        let total = realized + unrealized;

        conn.execute(
            "INSERT INTO order_chains (
                chain_id, user_id, account_number, underlying, opening_order_id,
                strategy_type, opening_date, closing_date, chain_status,
                order_count, realized_pnl, unrealized_pnl, total_pnl, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, unixepoch())
            ON CONFLICT (chain_id, user_id) DO UPDATE SET
                account_number = excluded.account_number,
                underlying = excluded.underlying,
                opening_order_id = excluded.opening_order_id,
                strategy_type = excluded.strategy_type,
                opening_date = excluded.opening_date,
                closing_date = excluded.closing_date,
                chain_status = excluded.chain_status,
                order_count = excluded.order_count,
                realized_pnl = excluded.realized_pnl,
                unrealized_pnl = excluded.unrealized_pnl,
                total_pnl = excluded.total_pnl,
                updated_at = excluded.updated_at",
            params![
                chain.chain_id,
                ctx.user_id,
                chain.account_number,
                chain.underlying,
                chain.orders.first().map(|o| o.order_id.as_str()),
                strategy_type,
                chain.opening_date().map(|d| d.format("%Y-%m-%d").to_string()),
                chain.closing_date().map(|d| d.format("%Y-%m-%d").to_string()),
                chain.status.as_str(),
                chain.orders.len() as i64,
                realized.to_string(),
                unrealized.to_string(),
                total.to_string(),
            ],
        )?;

        let lot_by_tx: HashMap<&str, &Lot> = all_lots
            .iter()
            .map(|l| (l.transaction_id.as_str(), l))
            .collect();
        let mut derived_by_parent: HashMap<i64, Vec<&Lot>> = HashMap::new();
        for lot in &all_lots {
            if let Some(parent) = lot.derived_from_lot_id {
                derived_by_parent.entry(parent).or_default().push(lot);
            }
        }

        for order in &chain.orders {
            let order_data = order_cache_entry(order, &strategy_type, &lot_by_tx, &derived_by_parent);
            conn.execute(
                "INSERT INTO order_chain_cache (chain_id, order_id, user_id, order_data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (chain_id, order_id, user_id) DO UPDATE SET
                     order_data = excluded.order_data",
                params![
                    chain.chain_id,
                    order.order_id,
                    ctx.user_id,
                    serde_json::to_string(&order_data)?,
                ],
            )?;
        }
    }

    info!(chains = chains.len(), "updated chain cache");
    Ok(())
}

fn clear_cache(
    conn: &Connection,
    ctx: &Ctx,
    affected_underlyings: Option<&[String]>,
) -> Result<()> {
    match affected_underlyings {
        Some(list) if !list.is_empty() => {
            let placeholders = sql_placeholders(list.len());
            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
            for u in list {
                params_vec.push(u);
            }
            conn.execute(
                &format!(
                    "DELETE FROM order_chain_cache WHERE user_id = ?1 AND chain_id IN (
                         SELECT chain_id FROM order_chains
                         WHERE user_id = ?1 AND underlying IN ({placeholders})
                     )"
                ),
                params_vec.as_slice(),
            )?;
            conn.execute(
                &format!(
                    "DELETE FROM order_chains
                     WHERE user_id = ?1 AND underlying IN ({placeholders})"
                ),
                params_vec.as_slice(),
            )?;
        }
        _ => {
            conn.execute("DELETE FROM order_chain_cache WHERE user_id = ?1", [&ctx.user_id])?;
            conn.execute("DELETE FROM order_chains WHERE user_id = ?1", [&ctx.user_id])?;
        }
    }
    Ok(())
}

fn detect_strategy(chain_lots: &[Lot]) -> String {
    if chain_lots.is_empty() {
        return "Unknown".to_string();
    }
    let legs = strategy::lots_to_legs(chain_lots);
    let result = strategy::recognize(&legs);
    if result.confidence > 0.0 {
        result.name
    } else {
        "Unknown".to_string()
    }
}

/// Net entry premium of the still-open part of each lot: credit received for
/// shorts, debit paid for longs. This is what the chains view reports as
/// unrealized until the position closes.
fn open_premium(lots: &[Lot]) -> Decimal {
    let mut total = Decimal::ZERO;
    for lot in lots {
        if !lot.is_open() {
            continue;
        }
        let amount = lot.entry_price * lot.remaining_quantity.abs() * lot.multiplier();
        if lot.is_short() {
            total += amount;
        } else {
            total -= amount;
        }
    }
    total
}

fn order_cache_entry(
    order: &Order,
    strategy_type: &str,
    lot_by_tx: &HashMap<&str, &Lot>,
    derived_by_parent: &HashMap<i64, Vec<&Lot>>,
) -> serde_json::Value {
    let mut positions = Vec::new();

    for tx in &order.transactions {
        let mut position = json!({
            "symbol": tx.symbol,
            "underlying": tx.underlying,
            "instrument_type": tx.instrument_type.as_str(),
            "option_type": tx.option.map(|o| o.option_type.as_str()),
            "strike": tx.option.map(|o| o.strike),
            "expiration": tx.option.map(|o| o.expiration.format("%Y-%m-%d").to_string()),
            "quantity": tx.quantity,
            "action": tx.action.map(|a| a.as_str()),
            "price": tx.price,
            "transaction_id": tx.id,
        });

        if tx.is_opening() {
            if let Some(lot) = lot_by_tx.get(tx.id.as_str()) {
                position["lot_id"] = json!(lot.id);
                position["leg_index"] = json!(lot.leg_index);
                position["original_quantity"] = json!(lot.original_quantity);
                position["remaining_quantity"] = json!(lot.remaining_quantity);
                position["status"] = json!(lot.status.as_str());

                if let Some(derived) = derived_by_parent.get(&lot.id) {
                    let derived_positions: Vec<_> = derived
                        .iter()
                        .map(|d| {
                            json!({
                                "lot_id": d.id,
                                "symbol": d.symbol,
                                "underlying": d.underlying,
                                "derivation_type": d.derivation_type.map(|t| t.as_str()),
                                "quantity": d.quantity,
                                "entry_price": d.entry_price,
                                "remaining_quantity": d.remaining_quantity,
                                "status": d.status.as_str(),
                            })
                        })
                        .collect();
                    position["derived_positions"] = json!(derived_positions);
                }
            }
        }

        positions.push(position);
    }

    json!({
        "order_id": order.order_id,
        "order_type": order.order_type.as_str(),
        "order_date": order.executed_at.to_rfc3339(),
        "strategy_type": strategy_type,
        "positions": positions,
    })
}

// ── Reads ────────────────────────────────────────────────────────────

const SUMMARY_COLUMNS: &str = "chain_id, account_number, underlying, strategy_type,
    chain_status, order_count, realized_pnl, unrealized_pnl, total_pnl,
    opening_date, closing_date";

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChainSummary> {
    Ok(ChainSummary {
        chain_id: row.get(0)?,
        account_number: row.get(1)?,
        underlying: row.get(2)?,
        strategy_type: row.get(3)?,
        status: parse_enum::<ChainStatus>(row, 4)?,
        order_count: row.get(5)?,
        realized_pnl: crate::store::decimal_value(row, 6)?,
        unrealized_pnl: crate::store::decimal_value(row, 7)?,
        total_pnl: crate::store::decimal_value(row, 8)?,
        opening_date: opt_date_value(row, 9)?,
        closing_date: opt_date_value(row, 10)?,
    })
}

pub fn get_chain_summaries(
    conn: &Connection,
    ctx: &Ctx,
    account_number: Option<&str>,
    underlying: Option<&str>,
) -> rusqlite::Result<Vec<ChainSummary>> {
    let mut sql = format!("SELECT {SUMMARY_COLUMNS} FROM order_chains WHERE user_id = ?");
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    if let Some(ref acct) = account_number {
        sql.push_str(" AND account_number = ?");
        params_vec.push(acct);
    }
    if let Some(ref und) = underlying {
        sql.push_str(" AND underlying = ?");
        params_vec.push(und);
    }
    sql.push_str(" ORDER BY opening_date DESC, chain_id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_vec.as_slice(), row_to_summary)?;
    rows.collect()
}

/// Metadata for seeding a group from its source chain.
pub struct ChainMeta {
    pub strategy_type: Option<String>,
    pub opening_date: Option<String>,
    pub closing_date: Option<String>,
    pub status: String,
    pub underlying: String,
}

pub fn get_chain_meta(
    conn: &Connection,
    ctx: &Ctx,
    chain_id: &str,
) -> rusqlite::Result<Option<ChainMeta>> {
    conn.query_row(
        "SELECT strategy_type, opening_date, closing_date, chain_status, underlying
         FROM order_chains WHERE user_id = ?1 AND chain_id = ?2",
        params![ctx.user_id, chain_id],
        |row| {
            Ok(ChainMeta {
                strategy_type: row.get(0)?,
                opening_date: row.get(1)?,
                closing_date: row.get(2)?,
                status: row.get(3)?,
                underlying: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Cached order JSON blobs for a set of order ids.
pub fn get_order_data(
    conn: &Connection,
    ctx: &Ctx,
    order_ids: &[String],
) -> Result<HashMap<String, serde_json::Value>> {
    let mut result = HashMap::new();
    if order_ids.is_empty() {
        return Ok(result);
    }
    let placeholders = sql_placeholders(order_ids.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT order_id, order_data FROM order_chain_cache
         WHERE user_id = ?1 AND order_id IN ({placeholders})"
    ))?;
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in order_ids {
        params_vec.push(id);
    }
    let rows = stmt.query_map(params_vec.as_slice(), |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (order_id, data) = row?;
        result.insert(order_id, serde_json::from_str(&data)?);
    }
    Ok(result)
}
