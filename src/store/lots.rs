//! Lot and closing persistence: creation, FIFO closing, derived lots.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::context::Ctx;
use crate::model::symbol::OptionType;
use crate::model::{ClosingType, DerivationType, InstrumentType, Lot, LotClosing, LotStatus};
use crate::store::{
    datetime_value, decimal_value, opt_date_value, opt_decimal_value, opt_parse_enum, parse_enum,
    sql_datetime, sql_placeholders,
};

/// Everything needed to insert a lot row. Built by Stage 3 from a typed
/// transaction (sign already applied) or from an assignment stock row.
#[derive(Debug, Clone)]
pub struct NewLot<'a> {
    pub transaction_id: &'a str,
    pub account_number: &'a str,
    pub symbol: &'a str,
    pub underlying: &'a str,
    pub instrument_type: InstrumentType,
    pub option_type: Option<OptionType>,
    pub strike: Option<Decimal>,
    pub expiration: Option<NaiveDate>,
    /// Signed: positive long, negative short.
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_date: DateTime<Utc>,
    pub chain_id: Option<&'a str>,
    pub leg_index: i64,
    pub opening_order_id: Option<&'a str>,
    pub derived_from_lot_id: Option<i64>,
    pub derivation_type: Option<DerivationType>,
}

pub fn insert_lot(conn: &Connection, ctx: &Ctx, lot: &NewLot<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO position_lots (
            user_id, transaction_id, account_number, symbol, underlying,
            instrument_type, option_type, strike, expiration, quantity,
            entry_price, entry_date, remaining_quantity, original_quantity,
            chain_id, leg_index, opening_order_id, derived_from_lot_id,
            derivation_type, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, 'OPEN')",
        params![
            ctx.user_id,
            lot.transaction_id,
            lot.account_number,
            lot.symbol,
            lot.underlying,
            lot.instrument_type.as_str(),
            lot.option_type.map(|t| t.as_str()),
            lot.strike.map(|s| s.to_string()),
            lot.expiration.map(|e| e.format("%Y-%m-%d").to_string()),
            lot.quantity.normalize().to_string(),
            lot.entry_price.to_string(),
            sql_datetime(&lot.entry_date),
            lot.quantity.normalize().to_string(),
            lot.quantity.abs().normalize().to_string(),
            lot.chain_id,
            lot.leg_index,
            lot.opening_order_id,
            lot.derived_from_lot_id,
            lot.derivation_type.map(|d| d.as_str()),
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(lot_id = id, symbol = lot.symbol, quantity = %lot.quantity, "created lot");
    Ok(id)
}

/// Parameters for one FIFO closing pass against `(account, symbol)`.
#[derive(Debug, Clone)]
pub struct FifoClose<'a> {
    pub account_number: &'a str,
    pub symbol: &'a str,
    /// Absolute quantity to close.
    pub quantity_to_close: Decimal,
    pub closing_price: Decimal,
    pub closing_order_id: &'a str,
    pub closing_transaction_id: Option<&'a str>,
    pub closing_date: DateTime<Utc>,
    pub closing_type: ClosingType,
    /// `Some(true)` matches long lots only (STC), `Some(false)` short lots
    /// only (BTC), `None` either direction.
    pub close_long: Option<bool>,
}

/// What a FIFO pass actually did.
#[derive(Debug, Clone, Default)]
pub struct FifoOutcome {
    pub realized_pnl: Decimal,
    pub quantity_closed: Decimal,
    pub lot_ids: Vec<i64>,
}

/// Close lots FIFO by entry date. Consumes from each candidate lot in turn
/// until the closing quantity is exhausted. A close that finds no candidate
/// lots returns an empty outcome; reconciliation surfaces the mismatch.
pub fn close_lot_fifo(
    conn: &Connection,
    ctx: &Ctx,
    close: &FifoClose<'_>,
) -> rusqlite::Result<FifoOutcome> {
    let direction_clause = match close.close_long {
        Some(true) => " AND CAST(quantity AS REAL) > 0",
        Some(false) => " AND CAST(quantity AS REAL) < 0",
        None => "",
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT id, quantity, entry_price, remaining_quantity, option_type
         FROM position_lots
         WHERE user_id = ?1 AND account_number = ?2 AND symbol = ?3
           AND remaining_quantity != '0' AND status != 'CLOSED'
           {direction_clause}
         ORDER BY entry_date ASC, id ASC"
    ))?;

    struct Candidate {
        id: i64,
        quantity: Decimal,
        entry_price: Decimal,
        remaining: Decimal,
        is_option: bool,
    }

    let candidates: Vec<Candidate> = stmt
        .query_map(
            params![ctx.user_id, close.account_number, close.symbol],
            |row| {
                Ok(Candidate {
                    id: row.get(0)?,
                    quantity: decimal_value(row, 1)?,
                    entry_price: decimal_value(row, 2)?,
                    remaining: decimal_value(row, 3)?,
                    is_option: row.get::<_, Option<String>>(4)?.is_some(),
                })
            },
        )?
        .collect::<rusqlite::Result<_>>()?;

    if candidates.is_empty() {
        warn!(
            symbol = close.symbol,
            account = close.account_number,
            "FIFO close found no open lots; broker reported a close with no prior open"
        );
        return Ok(FifoOutcome::default());
    }

    let mut outcome = FifoOutcome::default();
    let mut still_to_close = close.quantity_to_close.abs();

    for lot in candidates {
        if still_to_close <= Decimal::ZERO {
            break;
        }

        let available = lot.remaining.abs();
        let close_amount = available.min(still_to_close);
        let multiplier = if lot.is_option {
            Decimal::ONE_HUNDRED
        } else {
            Decimal::ONE
        };

        let pnl = if lot.quantity > Decimal::ZERO {
            (close.closing_price - lot.entry_price) * close_amount * multiplier
        } else {
            (lot.entry_price - close.closing_price) * close_amount * multiplier
        };

        let mut new_remaining = available - close_amount;
        if lot.quantity < Decimal::ZERO {
            new_remaining = -new_remaining;
        }
        let new_status = if new_remaining == Decimal::ZERO {
            LotStatus::Closed
        } else {
            LotStatus::Partial
        };

        conn.execute(
            "UPDATE position_lots SET remaining_quantity = ?1, status = ?2
             WHERE id = ?3 AND user_id = ?4",
            params![
                new_remaining.normalize().to_string(),
                new_status.as_str(),
                lot.id,
                ctx.user_id
            ],
        )?;

        insert_closing(
            conn,
            ctx,
            &NewClosing {
                lot_id: lot.id,
                closing_order_id: close.closing_order_id,
                closing_transaction_id: close.closing_transaction_id,
                quantity_closed: close_amount,
                closing_price: close.closing_price,
                closing_date: close.closing_date,
                closing_type: close.closing_type,
                realized_pnl: pnl,
            },
        )?;

        debug!(lot_id = lot.id, amount = %close_amount, pnl = %pnl, "closed against lot");

        outcome.realized_pnl += pnl;
        outcome.quantity_closed += close_amount;
        outcome.lot_ids.push(lot.id);
        still_to_close -= close_amount;
    }

    Ok(outcome)
}

#[derive(Debug, Clone)]
pub struct NewClosing<'a> {
    pub lot_id: i64,
    pub closing_order_id: &'a str,
    pub closing_transaction_id: Option<&'a str>,
    pub quantity_closed: Decimal,
    pub closing_price: Decimal,
    pub closing_date: DateTime<Utc>,
    pub closing_type: ClosingType,
    pub realized_pnl: Decimal,
}

pub fn insert_closing(conn: &Connection, ctx: &Ctx, closing: &NewClosing<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO lot_closings (
            user_id, lot_id, closing_order_id, closing_transaction_id,
            quantity_closed, closing_price, closing_date, closing_type, realized_pnl
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            ctx.user_id,
            closing.lot_id,
            closing.closing_order_id,
            closing.closing_transaction_id,
            closing.quantity_closed.to_string(),
            closing.closing_price.to_string(),
            sql_datetime(&closing.closing_date),
            closing.closing_type.as_str(),
            closing.realized_pnl.to_string(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// The option lot most recently closed by assignment/exercise whose closing
/// has not yet produced a derived stock lot.
pub fn find_derivation_source(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    symbol: &str,
    closing_type: ClosingType,
) -> rusqlite::Result<Option<(i64, Option<String>, Option<OptionType>, Option<Decimal>, String)>> {
    conn.query_row(
        "SELECT pl.id, pl.chain_id, pl.option_type, pl.strike, lc.closing_order_id
         FROM position_lots pl
         JOIN lot_closings lc ON pl.id = lc.lot_id AND lc.user_id = pl.user_id
         WHERE pl.user_id = ?1 AND pl.account_number = ?2 AND pl.symbol = ?3
           AND lc.closing_type = ?4 AND lc.resulting_lot_id IS NULL
         ORDER BY lc.closing_date DESC, lc.closing_id DESC
         LIMIT 1",
        params![ctx.user_id, account_number, symbol, closing_type.as_str()],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                opt_parse_enum::<OptionType>(row, 2)?,
                opt_decimal_value(row, 3)?,
                row.get(4)?,
            ))
        },
    )
    .optional()
}

/// Back-link the newest unresolved closing of `source_lot_id` to the derived
/// lot it produced.
pub fn link_resulting_lot(
    conn: &Connection,
    ctx: &Ctx,
    source_lot_id: i64,
    closing_type: ClosingType,
    resulting_lot_id: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE lot_closings SET resulting_lot_id = ?1
         WHERE closing_id = (
             SELECT closing_id FROM lot_closings
             WHERE user_id = ?2 AND lot_id = ?3 AND closing_type = ?4
               AND resulting_lot_id IS NULL
             ORDER BY closing_id DESC LIMIT 1
         )",
        params![
            resulting_lot_id,
            ctx.user_id,
            source_lot_id,
            closing_type.as_str()
        ],
    )?;
    Ok(())
}

// ── Queries ──────────────────────────────────────────────────────────

const LOT_COLUMNS: &str = "id, transaction_id, account_number, symbol, underlying,
    instrument_type, option_type, strike, expiration, quantity, entry_price,
    entry_date, remaining_quantity, original_quantity, chain_id, leg_index,
    opening_order_id, derived_from_lot_id, derivation_type, status";

const LOT_COLUMNS_PL: &str = "pl.id, pl.transaction_id, pl.account_number, pl.symbol,
    pl.underlying, pl.instrument_type, pl.option_type, pl.strike, pl.expiration,
    pl.quantity, pl.entry_price, pl.entry_date, pl.remaining_quantity,
    pl.original_quantity, pl.chain_id, pl.leg_index, pl.opening_order_id,
    pl.derived_from_lot_id, pl.derivation_type, pl.status";

pub(crate) fn row_to_lot(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lot> {
    Ok(Lot {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        account_number: row.get(2)?,
        symbol: row.get(3)?,
        underlying: row.get(4)?,
        instrument_type: parse_enum(row, 5)?,
        option_type: opt_parse_enum(row, 6)?,
        strike: opt_decimal_value(row, 7)?,
        expiration: opt_date_value(row, 8)?,
        quantity: decimal_value(row, 9)?,
        entry_price: decimal_value(row, 10)?,
        entry_date: datetime_value(row, 11)?,
        remaining_quantity: decimal_value(row, 12)?,
        original_quantity: decimal_value(row, 13)?,
        chain_id: row.get(14)?,
        leg_index: row.get(15)?,
        opening_order_id: row.get(16)?,
        derived_from_lot_id: row.get(17)?,
        derivation_type: opt_parse_enum(row, 18)?,
        status: parse_enum(row, 19)?,
    })
}

pub fn get_lot(conn: &Connection, ctx: &Ctx, lot_id: i64) -> rusqlite::Result<Option<Lot>> {
    conn.query_row(
        &format!("SELECT {LOT_COLUMNS} FROM position_lots WHERE user_id = ?1 AND id = ?2"),
        params![ctx.user_id, lot_id],
        row_to_lot,
    )
    .optional()
}

pub fn get_all_lots(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<Vec<Lot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOT_COLUMNS} FROM position_lots WHERE user_id = ?1
         ORDER BY entry_date ASC, id ASC"
    ))?;
    let rows = stmt.query_map([&ctx.user_id], row_to_lot)?;
    rows.collect()
}

/// Open lots for `(account, symbol)`, FIFO-ordered.
pub fn get_open_lots(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    symbol: Option<&str>,
) -> rusqlite::Result<Vec<Lot>> {
    let mut sql = format!(
        "SELECT {LOT_COLUMNS} FROM position_lots
         WHERE user_id = ?1 AND account_number = ?2
           AND remaining_quantity != '0' AND status != 'CLOSED'"
    );
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id, &account_number];
    if let Some(ref s) = symbol {
        sql.push_str(" AND symbol = ?3");
        params_vec.push(s);
    }
    sql.push_str(" ORDER BY entry_date ASC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_vec.as_slice(), row_to_lot)?;
    rows.collect()
}

pub fn get_lots_for_chain(
    conn: &Connection,
    ctx: &Ctx,
    chain_id: &str,
    include_derived: bool,
) -> rusqlite::Result<Vec<Lot>> {
    let derived_clause = if include_derived {
        ""
    } else {
        " AND derived_from_lot_id IS NULL"
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOT_COLUMNS} FROM position_lots
         WHERE user_id = ?1 AND chain_id = ?2{derived_clause}
         ORDER BY entry_date ASC, leg_index ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![ctx.user_id, chain_id], row_to_lot)?;
    rows.collect()
}

/// Lots whose transaction is not linked into any position group.
pub fn get_unassigned_lots(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<Vec<Lot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOT_COLUMNS_PL} FROM position_lots pl
         LEFT JOIN position_group_lots pgl
           ON pl.transaction_id = pgl.transaction_id AND pgl.user_id = pl.user_id
         WHERE pl.user_id = ?1 AND pgl.transaction_id IS NULL
         ORDER BY pl.entry_date ASC, pl.id ASC"
    ))?;
    let rows = stmt.query_map([&ctx.user_id], row_to_lot)?;
    rows.collect()
}

/// Lots linked into each of the given groups, keyed by group id.
pub fn get_lots_for_groups(
    conn: &Connection,
    ctx: &Ctx,
    group_ids: &[String],
) -> rusqlite::Result<HashMap<String, Vec<Lot>>> {
    let mut result: HashMap<String, Vec<Lot>> = group_ids
        .iter()
        .map(|id| (id.clone(), Vec::new()))
        .collect();
    if group_ids.is_empty() {
        return Ok(result);
    }

    let placeholders = sql_placeholders(group_ids.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT pgl.group_id, {LOT_COLUMNS_PL}
         FROM position_group_lots pgl
         JOIN position_lots pl
           ON pgl.transaction_id = pl.transaction_id AND pl.user_id = pgl.user_id
         WHERE pgl.user_id = ?1 AND pgl.group_id IN ({placeholders})
         ORDER BY pl.entry_date ASC, pl.leg_index ASC, pl.id ASC"
    ))?;
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in group_ids {
        params_vec.push(id);
    }
    let rows = stmt.query_map(params_vec.as_slice(), |row| {
        let group_id: String = row.get(0)?;
        // Lot columns start after the group id.
        let lot = Lot {
            id: row.get(1)?,
            transaction_id: row.get(2)?,
            account_number: row.get(3)?,
            symbol: row.get(4)?,
            underlying: row.get(5)?,
            instrument_type: parse_enum(row, 6)?,
            option_type: opt_parse_enum(row, 7)?,
            strike: opt_decimal_value(row, 8)?,
            expiration: opt_date_value(row, 9)?,
            quantity: decimal_value(row, 10)?,
            entry_price: decimal_value(row, 11)?,
            entry_date: datetime_value(row, 12)?,
            remaining_quantity: decimal_value(row, 13)?,
            original_quantity: decimal_value(row, 14)?,
            chain_id: row.get(15)?,
            leg_index: row.get(16)?,
            opening_order_id: row.get(17)?,
            derived_from_lot_id: row.get(18)?,
            derivation_type: opt_parse_enum(row, 19)?,
            status: parse_enum(row, 20)?,
        };
        Ok((group_id, lot))
    })?;
    for row in rows {
        let (group_id, lot) = row?;
        result.entry(group_id).or_default().push(lot);
    }
    Ok(result)
}

pub fn get_closings_for_lot(
    conn: &Connection,
    ctx: &Ctx,
    lot_id: i64,
) -> rusqlite::Result<Vec<LotClosing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLOSING_COLUMNS} FROM lot_closings
         WHERE user_id = ?1 AND lot_id = ?2
         ORDER BY closing_date ASC, closing_id ASC"
    ))?;
    let rows = stmt.query_map(params![ctx.user_id, lot_id], row_to_closing)?;
    rows.collect()
}

pub fn get_all_closings(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<Vec<LotClosing>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLOSING_COLUMNS} FROM lot_closings WHERE user_id = ?1
         ORDER BY closing_date ASC, closing_id ASC"
    ))?;
    let rows = stmt.query_map([&ctx.user_id], row_to_closing)?;
    rows.collect()
}

/// Closings for many lots at once, keyed by lot id.
pub fn get_closings_for_lots(
    conn: &Connection,
    ctx: &Ctx,
    lot_ids: &[i64],
) -> rusqlite::Result<HashMap<i64, Vec<LotClosing>>> {
    let mut result: HashMap<i64, Vec<LotClosing>> =
        lot_ids.iter().map(|id| (*id, Vec::new())).collect();
    if lot_ids.is_empty() {
        return Ok(result);
    }

    let placeholders = sql_placeholders(lot_ids.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT {CLOSING_COLUMNS} FROM lot_closings
         WHERE user_id = ?1 AND lot_id IN ({placeholders})
         ORDER BY closing_date ASC, closing_id ASC"
    ))?;
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in lot_ids {
        params_vec.push(id);
    }
    let rows = stmt.query_map(params_vec.as_slice(), row_to_closing)?;
    for closing in rows {
        let closing = closing?;
        result.entry(closing.lot_id).or_default().push(closing);
    }
    Ok(result)
}

const CLOSING_COLUMNS: &str = "closing_id, lot_id, closing_order_id, closing_transaction_id,
    quantity_closed, closing_price, closing_date, closing_type, realized_pnl, resulting_lot_id";

pub(crate) fn row_to_closing(row: &rusqlite::Row<'_>) -> rusqlite::Result<LotClosing> {
    Ok(LotClosing {
        closing_id: row.get(0)?,
        lot_id: row.get(1)?,
        closing_order_id: row.get(2)?,
        closing_transaction_id: row.get(3)?,
        quantity_closed: decimal_value(row, 4)?,
        closing_price: decimal_value(row, 5)?,
        closing_date: datetime_value(row, 6)?,
        closing_type: parse_enum(row, 7)?,
        realized_pnl: decimal_value(row, 8)?,
        resulting_lot_id: row.get(9)?,
    })
}

/// Total realized P&L over all closings of a chain's lots.
pub fn realized_pnl_for_chain(
    conn: &Connection,
    ctx: &Ctx,
    chain_id: &str,
) -> rusqlite::Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT lc.realized_pnl FROM lot_closings lc
         JOIN position_lots pl ON lc.lot_id = pl.id AND pl.user_id = lc.user_id
         WHERE lc.user_id = ?1 AND pl.chain_id = ?2",
    )?;
    let rows = stmt.query_map(params![ctx.user_id, chain_id], |row| decimal_value(row, 0))?;
    let mut total = Decimal::ZERO;
    for pnl in rows {
        total += pnl?;
    }
    Ok(total)
}

/// Stage-4 refinement: rewrite the chain id of every lot opened by one of
/// `order_ids`, plus any derived lots parented to them.
pub fn assign_chain_to_orders(
    conn: &Connection,
    ctx: &Ctx,
    chain_id: &str,
    order_ids: &[String],
) -> rusqlite::Result<()> {
    if order_ids.is_empty() {
        return Ok(());
    }
    let placeholders = sql_placeholders(order_ids.len());
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&chain_id, &ctx.user_id];
    for id in order_ids {
        params_vec.push(id);
    }
    conn.execute(
        &format!(
            "UPDATE position_lots SET chain_id = ?1
             WHERE user_id = ?2 AND opening_order_id IN ({placeholders})"
        ),
        params_vec.as_slice(),
    )?;
    conn.execute(
        &format!(
            "UPDATE position_lots SET chain_id = ?1
             WHERE user_id = ?2 AND derived_from_lot_id IN (
                 SELECT id FROM position_lots
                 WHERE user_id = ?2 AND opening_order_id IN ({placeholders})
             )"
        ),
        params_vec.as_slice(),
    )?;
    Ok(())
}

pub fn update_lot_remaining(
    conn: &Connection,
    ctx: &Ctx,
    lot_id: i64,
    remaining: Decimal,
    status: LotStatus,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE position_lots SET remaining_quantity = ?1, status = ?2
         WHERE id = ?3 AND user_id = ?4",
        params![
            remaining.normalize().to_string(),
            status.as_str(),
            lot_id,
            ctx.user_id
        ],
    )?;
    Ok(())
}

/// Force-close lots by transaction id (stale-position cleanup).
pub fn force_close_lots(
    conn: &Connection,
    ctx: &Ctx,
    transaction_ids: &[String],
) -> rusqlite::Result<usize> {
    if transaction_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = sql_placeholders(transaction_ids.len());
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in transaction_ids {
        params_vec.push(id);
    }
    conn.execute(
        &format!(
            "UPDATE position_lots SET remaining_quantity = '0', status = 'CLOSED'
             WHERE user_id = ?1 AND transaction_id IN ({placeholders})"
        ),
        params_vec.as_slice(),
    )
}

/// Delete lots and their closings, either everything for the user or only
/// the given underlyings (incremental reprocess).
pub fn clear_lots(
    conn: &Connection,
    ctx: &Ctx,
    underlyings: Option<&[String]>,
) -> rusqlite::Result<()> {
    match underlyings {
        Some(list) if !list.is_empty() => {
            let placeholders = sql_placeholders(list.len());
            let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
            for u in list {
                params_vec.push(u);
            }
            conn.execute(
                &format!(
                    "DELETE FROM lot_closings WHERE user_id = ?1 AND lot_id IN (
                         SELECT id FROM position_lots
                         WHERE user_id = ?1 AND underlying IN ({placeholders})
                     )"
                ),
                params_vec.as_slice(),
            )?;
            conn.execute(
                &format!(
                    "DELETE FROM position_lots
                     WHERE user_id = ?1 AND underlying IN ({placeholders})"
                ),
                params_vec.as_slice(),
            )?;
        }
        _ => {
            conn.execute("DELETE FROM lot_closings WHERE user_id = ?1", [&ctx.user_id])?;
            conn.execute("DELETE FROM position_lots WHERE user_id = ?1", [&ctx.user_id])?;
        }
    }
    Ok(())
}

/// `(account, symbol)` pairs holding both long and short open equity lots.
pub fn nettable_equity_pairs(
    conn: &Connection,
    ctx: &Ctx,
) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT account_number, symbol FROM position_lots
         WHERE user_id = ?1 AND instrument_type = 'EQUITY'
           AND remaining_quantity != '0' AND status != 'CLOSED'
         GROUP BY account_number, symbol
         HAVING MIN(CAST(remaining_quantity AS REAL)) < 0
            AND MAX(CAST(remaining_quantity AS REAL)) > 0",
    )?;
    let rows = stmt.query_map([&ctx.user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// Open short equity lots for a pair, FIFO-ordered.
pub fn open_short_equity_lots(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    symbol: &str,
) -> rusqlite::Result<Vec<Lot>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOT_COLUMNS} FROM position_lots
         WHERE user_id = ?1 AND account_number = ?2 AND symbol = ?3
           AND instrument_type = 'EQUITY'
           AND CAST(remaining_quantity AS REAL) < 0 AND status != 'CLOSED'
         ORDER BY entry_date ASC, id ASC"
    ))?;
    let rows = stmt.query_map(params![ctx.user_id, account_number, symbol], row_to_lot)?;
    rows.collect()
}

/// Latest entry date among open long equity lots of a pair.
pub fn latest_long_equity_entry(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    symbol: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let mut stmt = conn.prepare(
        "SELECT entry_date FROM position_lots
         WHERE user_id = ?1 AND account_number = ?2 AND symbol = ?3
           AND instrument_type = 'EQUITY'
           AND CAST(remaining_quantity AS REAL) > 0 AND status != 'CLOSED'
         ORDER BY entry_date DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map(params![ctx.user_id, account_number, symbol], |row| {
        datetime_value(row, 0)
    })?;
    rows.next().transpose()
}

/// Net open quantity per `(account, symbol)`, for reconciliation.
/// Summed in exact decimal arithmetic; pairs that net to zero are dropped.
pub fn open_quantity_by_position(
    conn: &Connection,
    ctx: &Ctx,
) -> rusqlite::Result<Vec<OpenPosition>> {
    let mut stmt = conn.prepare(
        "SELECT pl.account_number, pl.symbol, pl.underlying,
                pl.remaining_quantity, pgl.group_id
         FROM position_lots pl
         LEFT JOIN position_group_lots pgl
           ON pl.transaction_id = pgl.transaction_id AND pgl.user_id = pl.user_id
         WHERE pl.user_id = ?1 AND pl.remaining_quantity != '0' AND pl.status != 'CLOSED'
         ORDER BY pl.account_number, pl.symbol, pl.id",
    )?;
    let rows = stmt.query_map([&ctx.user_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            decimal_value(row, 3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut by_key: HashMap<(String, String), OpenPosition> = HashMap::new();
    for row in rows {
        let (account, symbol, underlying, quantity, group_id) = row?;
        let entry = by_key
            .entry((account.clone(), symbol.clone()))
            .or_insert_with(|| OpenPosition {
                account_number: account,
                symbol,
                underlying,
                quantity: Decimal::ZERO,
                group_id: None,
            });
        entry.quantity += quantity;
        if entry.group_id.is_none() {
            entry.group_id = group_id;
        }
    }

    let mut out: Vec<OpenPosition> = by_key
        .into_values()
        .filter(|p| p.quantity != Decimal::ZERO)
        .collect();
    out.sort_by(|a, b| {
        (a.account_number.as_str(), a.symbol.as_str())
            .cmp(&(b.account_number.as_str(), b.symbol.as_str()))
    });
    Ok(out)
}

/// Net open ledger position for one `(account, symbol)`.
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub account_number: String,
    pub symbol: String,
    pub underlying: String,
    pub quantity: Decimal,
    pub group_id: Option<String>,
}
