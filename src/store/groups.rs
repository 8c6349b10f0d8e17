//! Position-group persistence and status refresh.

use rusqlite::{Connection, OptionalExtension, params};

use crate::context::Ctx;
use crate::model::{GroupStatus, PositionGroup};
use crate::store::{opt_datetime_value, parse_enum, sql_placeholders};

#[derive(Debug, Clone)]
pub struct NewGroup<'a> {
    pub group_id: &'a str,
    pub account_number: &'a str,
    pub underlying: &'a str,
    pub strategy_label: Option<&'a str>,
    pub source_chain_id: Option<&'a str>,
}

pub fn insert_group(conn: &Connection, ctx: &Ctx, group: &NewGroup<'_>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO position_groups (
            group_id, user_id, account_number, underlying, strategy_label,
            status, source_chain_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, 'OPEN', ?6)",
        params![
            group.group_id,
            ctx.user_id,
            group.account_number,
            group.underlying,
            group.strategy_label,
            group.source_chain_id,
        ],
    )?;
    Ok(())
}

pub fn link_lot(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
    transaction_id: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO position_group_lots (group_id, transaction_id, user_id)
         VALUES (?1, ?2, ?3)",
        params![group_id, transaction_id, ctx.user_id],
    )?;
    Ok(())
}

pub fn unlink_lots(
    conn: &Connection,
    ctx: &Ctx,
    transaction_ids: &[String],
) -> rusqlite::Result<Vec<String>> {
    if transaction_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = sql_placeholders(transaction_ids.len());
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in transaction_ids {
        params_vec.push(id);
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT group_id FROM position_group_lots
         WHERE user_id = ?1 AND transaction_id IN ({placeholders})"
    ))?;
    let sources: Vec<String> = stmt
        .query_map(params_vec.as_slice(), |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;

    conn.execute(
        &format!(
            "DELETE FROM position_group_lots
             WHERE user_id = ?1 AND transaction_id IN ({placeholders})"
        ),
        params_vec.as_slice(),
    )?;
    Ok(sources)
}

const GROUP_COLUMNS: &str = "group_id, account_number, underlying, strategy_label,
    status, source_chain_id, opening_date, closing_date";

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionGroup> {
    Ok(PositionGroup {
        group_id: row.get(0)?,
        account_number: row.get(1)?,
        underlying: row.get(2)?,
        strategy_label: row.get(3)?,
        status: parse_enum::<GroupStatus>(row, 4)?,
        source_chain_id: row.get(5)?,
        opening_date: opt_datetime_value(row, 6)?,
        closing_date: opt_datetime_value(row, 7)?,
    })
}

pub fn get_group(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
) -> rusqlite::Result<Option<PositionGroup>> {
    conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM position_groups WHERE user_id = ?1 AND group_id = ?2"),
        params![ctx.user_id, group_id],
        row_to_group,
    )
    .optional()
}

pub fn get_groups(
    conn: &Connection,
    ctx: &Ctx,
    account_number: Option<&str>,
    underlying: Option<&str>,
) -> rusqlite::Result<Vec<PositionGroup>> {
    let mut sql = format!("SELECT {GROUP_COLUMNS} FROM position_groups WHERE user_id = ?");
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    if let Some(ref acct) = account_number {
        sql.push_str(" AND account_number = ?");
        params_vec.push(acct);
    }
    if let Some(ref und) = underlying {
        sql.push_str(" AND underlying = ?");
        params_vec.push(und);
    }
    sql.push_str(" ORDER BY underlying ASC, opening_date DESC, group_id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_vec.as_slice(), row_to_group)?;
    rows.collect()
}

pub fn group_count(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM position_groups WHERE user_id = ?1",
        [&ctx.user_id],
        |row| row.get(0),
    )
}

pub fn find_group_by_source_chain(
    conn: &Connection,
    ctx: &Ctx,
    chain_id: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT group_id FROM position_groups
         WHERE user_id = ?1 AND source_chain_id = ?2",
        params![ctx.user_id, chain_id],
        |row| row.get(0),
    )
    .optional()
}

/// An OPEN group for `(account, underlying)`, if any. CLOSED groups are
/// never reused for new lots.
pub fn find_open_group(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    underlying: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT group_id FROM position_groups
         WHERE user_id = ?1 AND account_number = ?2 AND underlying = ?3
           AND status = 'OPEN'
         ORDER BY opening_date ASC, group_id ASC LIMIT 1",
        params![ctx.user_id, account_number, underlying],
        |row| row.get(0),
    )
    .optional()
}

pub fn find_ungrouped_group(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    underlying: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT group_id FROM position_groups
         WHERE user_id = ?1 AND account_number = ?2 AND underlying = ?3
           AND source_chain_id IS NULL AND strategy_label = ?4",
        params![
            ctx.user_id,
            account_number,
            underlying,
            crate::model::group::UNGROUPED_LABEL
        ],
        |row| row.get(0),
    )
    .optional()
}

/// Groups whose `source_chain_id` no longer exists in `order_chains`.
pub fn stale_source_groups(
    conn: &Connection,
    ctx: &Ctx,
) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT pg.group_id, pg.source_chain_id
         FROM position_groups pg
         LEFT JOIN order_chains oc
           ON pg.source_chain_id = oc.chain_id AND oc.user_id = pg.user_id
         WHERE pg.user_id = ?1 AND pg.source_chain_id IS NOT NULL
           AND oc.chain_id IS NULL",
    )?;
    let rows = stmt.query_map([&ctx.user_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

/// The chain id of the group's earliest lot, used to rebind groups whose
/// source chain was renumbered.
pub fn earliest_chain_for_group(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT pl.chain_id FROM position_group_lots pgl
         JOIN position_lots pl
           ON pgl.transaction_id = pl.transaction_id AND pl.user_id = pgl.user_id
         WHERE pgl.user_id = ?1 AND pgl.group_id = ?2 AND pl.chain_id IS NOT NULL
         ORDER BY pl.entry_date ASC, pl.id ASC LIMIT 1",
        params![ctx.user_id, group_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn rebind_group(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
    chain_id: &str,
    underlying: &str,
    strategy_label: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE position_groups
         SET source_chain_id = ?1, underlying = ?2, strategy_label = ?3,
             updated_at = unixepoch()
         WHERE user_id = ?4 AND group_id = ?5",
        params![chain_id, underlying, strategy_label, ctx.user_id, group_id],
    )?;
    Ok(())
}

pub fn update_group_label(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
    strategy_label: &str,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE position_groups SET strategy_label = ?1, updated_at = unixepoch()
         WHERE user_id = ?2 AND group_id = ?3",
        params![strategy_label, ctx.user_id, group_id],
    )?;
    Ok(changed > 0)
}

pub fn delete_group(conn: &Connection, ctx: &Ctx, group_id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM position_group_lots WHERE user_id = ?1 AND group_id = ?2",
        params![ctx.user_id, group_id],
    )?;
    conn.execute(
        "DELETE FROM position_groups WHERE user_id = ?1 AND group_id = ?2",
        params![ctx.user_id, group_id],
    )?;
    Ok(())
}

pub fn lot_count(conn: &Connection, ctx: &Ctx, group_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM position_group_lots WHERE user_id = ?1 AND group_id = ?2",
        params![ctx.user_id, group_id],
        |row| row.get(0),
    )
}

/// Transaction ids of the group's still-open lots.
pub fn open_lot_transactions_for_group(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT pgl.transaction_id FROM position_group_lots pgl
         JOIN position_lots pl
           ON pgl.transaction_id = pl.transaction_id AND pl.user_id = pgl.user_id
         WHERE pgl.user_id = ?1 AND pgl.group_id = ?2
           AND pl.remaining_quantity != '0' AND pl.status != 'CLOSED'",
    )?;
    let rows = stmt.query_map(params![ctx.user_id, group_id], |row| row.get(0))?;
    rows.collect()
}

/// Groups currently reported as holding positions.
pub fn open_groups(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<Vec<PositionGroup>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {GROUP_COLUMNS} FROM position_groups
         WHERE user_id = ?1 AND status IN ('OPEN', 'ASSIGNED')
         ORDER BY group_id ASC"
    ))?;
    let rows = stmt.query_map([&ctx.user_id], row_to_group)?;
    rows.collect()
}

/// Recalculate status, opening date, and closing date for one group.
/// A group whose lots have all been moved elsewhere is deleted.
pub fn refresh_group_status(conn: &Connection, ctx: &Ctx, group_id: &str) -> rusqlite::Result<()> {
    let total: i64 = lot_count(conn, ctx, group_id)?;
    if total == 0 {
        delete_group(conn, ctx, group_id)?;
        return Ok(());
    }

    let open_count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM position_group_lots pgl
         JOIN position_lots pl
           ON pgl.transaction_id = pl.transaction_id AND pl.user_id = pgl.user_id
         WHERE pgl.user_id = ?1 AND pgl.group_id = ?2
           AND pl.remaining_quantity != '0' AND pl.status != 'CLOSED'",
        params![ctx.user_id, group_id],
        |row| row.get(0),
    )?;
    let status = if open_count > 0 {
        GroupStatus::Open
    } else {
        GroupStatus::Closed
    };

    let opening_date: Option<String> = conn.query_row(
        "SELECT MIN(pl.entry_date) FROM position_group_lots pgl
         JOIN position_lots pl
           ON pgl.transaction_id = pl.transaction_id AND pl.user_id = pgl.user_id
         WHERE pgl.user_id = ?1 AND pgl.group_id = ?2",
        params![ctx.user_id, group_id],
        |row| row.get(0),
    )?;

    let closing_date: Option<String> = if status == GroupStatus::Closed {
        conn.query_row(
            "SELECT MAX(lc.closing_date) FROM lot_closings lc
             JOIN position_lots pl ON lc.lot_id = pl.id AND pl.user_id = lc.user_id
             JOIN position_group_lots pgl
               ON pl.transaction_id = pgl.transaction_id AND pgl.user_id = pl.user_id
             WHERE lc.user_id = ?1 AND pgl.group_id = ?2",
            params![ctx.user_id, group_id],
            |row| row.get(0),
        )?
    } else {
        None
    };

    conn.execute(
        "UPDATE position_groups
         SET status = ?1, opening_date = ?2, closing_date = ?3, updated_at = unixepoch()
         WHERE user_id = ?4 AND group_id = ?5",
        params![
            status.as_str(),
            opening_date,
            closing_date,
            ctx.user_id,
            group_id
        ],
    )?;
    Ok(())
}

pub fn refresh_all_group_statuses(conn: &Connection, ctx: &Ctx) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("SELECT group_id FROM position_groups WHERE user_id = ?1")?;
    let ids: Vec<String> = stmt
        .query_map([&ctx.user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    for group_id in ids {
        refresh_group_status(conn, ctx, &group_id)?;
    }
    Ok(())
}
