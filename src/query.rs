//! Read surface consumed by the ledger UI, plus the narrow set of mutations
//! it may perform (label edits, lot moves, empty-group management). All
//! reads are keyed by the context's user id and tolerate running between
//! pipeline passes.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::context::Ctx;
use crate::model::{ChainSummary, DerivationType, GroupStatus, LotStatus};
use crate::pipeline;
use crate::store::{chains, groups, lots};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("group `{0}` not found")]
    GroupNotFound(String),

    #[error("no lots selected")]
    NoLotsSelected,

    #[error("all lots must share the target group's account and underlying")]
    MixedScope,

    #[error("group `{0}` still has lots linked")]
    GroupNotEmpty(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosingView {
    pub closing_id: i64,
    pub quantity_closed: Decimal,
    pub closing_price: Decimal,
    pub closing_date: DateTime<Utc>,
    pub closing_type: String,
    pub realized_pnl: Decimal,
    pub resulting_lot_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LotView {
    pub lot_id: i64,
    pub transaction_id: String,
    pub symbol: String,
    pub underlying: String,
    pub instrument_type: String,
    pub option_type: Option<String>,
    pub strike: Option<Decimal>,
    pub expiration: Option<NaiveDate>,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_date: DateTime<Utc>,
    pub remaining_quantity: Decimal,
    pub original_quantity: Decimal,
    pub status: LotStatus,
    pub leg_index: i64,
    pub derived_from_lot_id: Option<i64>,
    pub derivation_type: Option<DerivationType>,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
    pub closings: Vec<ClosingView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub group_id: String,
    pub account_number: String,
    pub underlying: String,
    pub strategy_label: Option<String>,
    pub status: GroupStatus,
    pub source_chain_id: Option<String>,
    pub opening_date: Option<DateTime<Utc>>,
    pub closing_date: Option<DateTime<Utc>>,
    pub realized_pnl: Decimal,
    pub lot_count: usize,
    pub open_lot_count: usize,
    pub lots: Vec<LotView>,
    /// Cached order blobs for drill-down, newest first.
    pub orders: Vec<serde_json::Value>,
}

/// The main ledger view: position groups with their lots, closings, cost
/// basis, and derived-order drill-down.
pub fn ledger_view(
    conn: &Connection,
    ctx: &Ctx,
    account_number: Option<&str>,
    underlying: Option<&str>,
) -> Result<Vec<GroupView>> {
    // First visit after a reprocess that produced lots but no groups yet.
    if groups::group_count(conn, ctx)? == 0 && !lots::get_all_lots(conn, ctx)?.is_empty() {
        pipeline::groups::seed_position_groups(conn, ctx)?;
    }

    let group_rows = groups::get_groups(conn, ctx, account_number, underlying)?;
    if group_rows.is_empty() {
        return Ok(Vec::new());
    }

    let group_ids: Vec<String> = group_rows.iter().map(|g| g.group_id.clone()).collect();
    let lots_by_group = lots::get_lots_for_groups(conn, ctx, &group_ids)?;

    let all_lot_ids: Vec<i64> = lots_by_group
        .values()
        .flat_map(|ls| ls.iter().map(|l| l.id))
        .collect();
    let closings_by_lot = lots::get_closings_for_lots(conn, ctx, &all_lot_ids)?;

    let mut views = Vec::with_capacity(group_rows.len());
    for group in group_rows {
        let group_lots = lots_by_group.get(&group.group_id).cloned().unwrap_or_default();

        let mut order_ids: BTreeSet<String> = BTreeSet::new();
        let mut lot_views = Vec::with_capacity(group_lots.len());
        let mut realized = Decimal::ZERO;
        let mut open_count = 0;

        for lot in &group_lots {
            if let Some(oid) = &lot.opening_order_id {
                order_ids.insert(oid.clone());
            }

            let closings = closings_by_lot.get(&lot.id).cloned().unwrap_or_default();
            let lot_realized: Decimal = closings.iter().map(|c| c.realized_pnl).sum();
            realized += lot_realized;

            if lot.is_open() {
                open_count += 1;
            }

            for closing in &closings {
                order_ids.insert(closing.closing_order_id.clone());
            }

            lot_views.push(LotView {
                lot_id: lot.id,
                transaction_id: lot.transaction_id.clone(),
                symbol: lot.symbol.clone(),
                underlying: lot.underlying.clone(),
                instrument_type: lot.instrument_type.as_str().to_string(),
                option_type: lot.option_type.map(|t| t.as_str().to_string()),
                strike: lot.strike,
                expiration: lot.expiration,
                quantity: lot.quantity,
                entry_price: lot.entry_price,
                entry_date: lot.entry_date,
                remaining_quantity: lot.remaining_quantity,
                original_quantity: lot.original_quantity,
                status: lot.status,
                leg_index: lot.leg_index,
                derived_from_lot_id: lot.derived_from_lot_id,
                derivation_type: lot.derivation_type,
                cost_basis: lot.cost_basis(),
                realized_pnl: lot_realized,
                closings: closings
                    .iter()
                    .map(|c| ClosingView {
                        closing_id: c.closing_id,
                        quantity_closed: c.quantity_closed,
                        closing_price: c.closing_price,
                        closing_date: c.closing_date,
                        closing_type: c.closing_type.as_str().to_string(),
                        realized_pnl: c.realized_pnl,
                        resulting_lot_id: c.resulting_lot_id,
                    })
                    .collect(),
            });
        }

        let order_id_list: Vec<String> = order_ids.into_iter().collect();
        let order_data = chains::get_order_data(conn, ctx, &order_id_list)?;
        let mut orders: Vec<serde_json::Value> = order_data.into_values().collect();
        orders.sort_by(|a, b| {
            let da = a.get("order_date").and_then(|v| v.as_str()).unwrap_or_default();
            let db = b.get("order_date").and_then(|v| v.as_str()).unwrap_or_default();
            db.cmp(da)
        });

        views.push(GroupView {
            group_id: group.group_id,
            account_number: group.account_number,
            underlying: group.underlying,
            strategy_label: group.strategy_label,
            status: group.status,
            source_chain_id: group.source_chain_id,
            opening_date: group.opening_date,
            closing_date: group.closing_date,
            realized_pnl: realized,
            lot_count: lot_views.len(),
            open_lot_count: open_count,
            lots: lot_views,
            orders,
        });
    }

    Ok(views)
}

/// Cached chain summaries for the chains view.
pub fn chains_view(
    conn: &Connection,
    ctx: &Ctx,
    account_number: Option<&str>,
    underlying: Option<&str>,
) -> Result<Vec<ChainSummary>> {
    Ok(chains::get_chain_summaries(conn, ctx, account_number, underlying)?)
}

// ── Mutations ────────────────────────────────────────────────────────

/// Rename a group's strategy label. User edits win over pipeline labels.
pub fn update_group_label(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
    strategy_label: &str,
) -> Result<(), MutationError> {
    if !groups::update_group_label(conn, ctx, group_id, strategy_label)? {
        return Err(MutationError::GroupNotFound(group_id.to_string()));
    }
    Ok(())
}

/// Move lots (by transaction id) into a target group. Source and target
/// must share `(account, underlying)`; source/target statuses are refreshed
/// and emptied source groups are deleted.
pub fn move_lots(
    conn: &Connection,
    ctx: &Ctx,
    transaction_ids: &[String],
    target_group_id: &str,
) -> Result<(), MutationError> {
    if transaction_ids.is_empty() {
        return Err(MutationError::NoLotsSelected);
    }

    let target = groups::get_group(conn, ctx, target_group_id)?
        .ok_or_else(|| MutationError::GroupNotFound(target_group_id.to_string()))?;

    let placeholders = crate::store::sql_placeholders(transaction_ids.len());
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT account_number, underlying FROM position_lots
         WHERE user_id = ?1 AND transaction_id IN ({placeholders})"
    ))?;
    let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&ctx.user_id];
    for id in transaction_ids {
        params_vec.push(id);
    }
    let scopes: Vec<(String, String)> = stmt
        .query_map(params_vec.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;

    for (account, underlying) in &scopes {
        if account != &target.account_number || underlying != &target.underlying {
            return Err(MutationError::MixedScope);
        }
    }

    let source_groups = groups::unlink_lots(conn, ctx, transaction_ids)?;
    for id in transaction_ids {
        groups::link_lot(conn, ctx, target_group_id, id)?;
    }

    for source in source_groups {
        groups::refresh_group_status(conn, ctx, &source)?;
    }
    groups::refresh_group_status(conn, ctx, target_group_id)?;
    Ok(())
}

/// Create an empty group for manual curation.
pub fn create_group(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    underlying: &str,
    strategy_label: Option<&str>,
) -> Result<String, MutationError> {
    let group_id = Uuid::new_v4().to_string();
    groups::insert_group(
        conn,
        ctx,
        &groups::NewGroup {
            group_id: &group_id,
            account_number,
            underlying,
            strategy_label,
            source_chain_id: None,
        },
    )?;
    Ok(group_id)
}

/// Delete a group that has no lots linked.
pub fn delete_empty_group(
    conn: &Connection,
    ctx: &Ctx,
    group_id: &str,
) -> Result<(), MutationError> {
    if groups::get_group(conn, ctx, group_id)?.is_none() {
        return Err(MutationError::GroupNotFound(group_id.to_string()));
    }
    if groups::lot_count(conn, ctx, group_id)? > 0 {
        return Err(MutationError::GroupNotEmpty(group_id.to_string()));
    }
    groups::delete_group(conn, ctx, group_id)?;
    Ok(())
}
