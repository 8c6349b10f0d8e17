//! Stage 1 — persist raw broker transactions verbatim.

use rusqlite::Connection;
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::Ctx;
use crate::model::RawTransaction;
use crate::store::sql_datetime;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// Upsert raw transactions by `(id, user_id)`. Re-ingesting the same broker
/// batch is a no-op. Rows without a broker id are dropped with a warning;
/// only DB-level failures abort the batch.
pub fn save_raw_transactions(
    conn: &Connection,
    ctx: &Ctx,
    rows: &[RawTransaction],
) -> Result<usize, IngestError> {
    let mut stmt = conn.prepare(
        "INSERT INTO raw_transactions (
            id, user_id, account_number, order_id, symbol, underlying_symbol,
            action, instrument_type, transaction_type, transaction_sub_type,
            quantity, price, executed_at, commission, regulatory_fees,
            clearing_fees, value, description
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
        ON CONFLICT (id, user_id) DO NOTHING",
    )?;

    let mut saved = 0;
    for row in rows {
        if row.id.is_empty() || row.account_number.is_empty() {
            warn!(symbol = ?row.symbol, "dropping malformed transaction without id/account");
            continue;
        }

        let changed = stmt.execute(rusqlite::params![
            row.id,
            ctx.user_id,
            row.account_number,
            row.order_id,
            row.symbol,
            row.underlying_symbol,
            row.action,
            row.instrument_type,
            row.transaction_type,
            row.transaction_sub_type,
            row.quantity.to_string(),
            row.price.map(|p| p.to_string()),
            sql_datetime(&row.executed_at),
            row.commission.to_string(),
            row.regulatory_fees.to_string(),
            row.clearing_fees.to_string(),
            row.value.to_string(),
            row.description,
        ])?;

        if changed == 0 {
            debug!(id = %row.id, "duplicate raw transaction, upsert no-op");
        } else {
            saved += 1;
        }
    }

    Ok(saved)
}

/// All raw transactions for the user, in execution order (ties broken by id
/// so reprocessing is deterministic).
pub fn load_raw_transactions(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<Vec<RawTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RAW_COLUMNS} FROM raw_transactions WHERE user_id = ?1
         ORDER BY executed_at ASC, id ASC"
    ))?;
    let rows = stmt.query_map([&ctx.user_id], row_to_raw)?;
    rows.collect()
}

/// Raw transactions restricted to a set of underlyings (incremental mode).
pub fn load_raw_transactions_for_underlyings(
    conn: &Connection,
    ctx: &Ctx,
    underlyings: &[String],
) -> rusqlite::Result<Vec<RawTransaction>> {
    if underlyings.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = crate::store::sql_placeholders(underlyings.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT {RAW_COLUMNS} FROM raw_transactions
         WHERE user_id = ?1 AND underlying_symbol IN ({placeholders})
         ORDER BY executed_at ASC, id ASC"
    ))?;
    let mut params: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for u in underlyings {
        params.push(u);
    }
    let rows = stmt.query_map(params.as_slice(), row_to_raw)?;
    rows.collect()
}

const RAW_COLUMNS: &str = "id, account_number, order_id, symbol, underlying_symbol, action,
    instrument_type, transaction_type, transaction_sub_type, quantity, price,
    executed_at, commission, regulatory_fees, clearing_fees, value, description";

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTransaction> {
    Ok(RawTransaction {
        id: row.get(0)?,
        account_number: row.get(1)?,
        order_id: row.get(2)?,
        symbol: row.get(3)?,
        underlying_symbol: row.get(4)?,
        action: row.get(5)?,
        instrument_type: row.get(6)?,
        transaction_type: row.get(7)?,
        transaction_sub_type: row.get(8)?,
        quantity: crate::store::decimal_value(row, 9)?,
        price: crate::store::opt_decimal_value(row, 10)?,
        executed_at: crate::store::datetime_value(row, 11)?,
        commission: crate::store::decimal_value(row, 12)?,
        regulatory_fees: crate::store::decimal_value(row, 13)?,
        clearing_fees: crate::store::decimal_value(row, 14)?,
        value: crate::store::decimal_value(row, 15)?,
        description: row.get(16)?,
    })
}
