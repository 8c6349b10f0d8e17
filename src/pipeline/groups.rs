//! Stage 6 — group persistence.
//!
//! Maps chains and lots onto user-visible position groups while preserving
//! user edits: existing membership and strategy labels are never overwritten,
//! only stale source-chain references and statuses are refreshed.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use crate::context::Ctx;
use crate::model::Lot;
use crate::model::group::UNGROUPED_LABEL;
use crate::store::{chains, groups, lots};

/// Full seed: one group per chain referenced by a lot, plus "Ungrouped"
/// buckets for chainless lots. Idempotent — chains that already seeded a
/// group are skipped.
pub fn seed_position_groups(conn: &Connection, ctx: &Ctx) -> Result<usize> {
    let mut created = 0;

    let all_lots = lots::get_all_lots(conn, ctx)?;

    let mut chain_lots: Vec<(String, Vec<&Lot>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for lot in &all_lots {
        if let Some(chain_id) = &lot.chain_id {
            match index.get(chain_id.as_str()) {
                Some(&i) => chain_lots[i].1.push(lot),
                None => {
                    index.insert(chain_id.as_str(), chain_lots.len());
                    chain_lots.push((chain_id.clone(), vec![lot]));
                }
            }
        }
    }

    for (chain_id, members) in &chain_lots {
        if groups::find_group_by_source_chain(conn, ctx, chain_id)?.is_some() {
            continue;
        }

        let meta = chains::get_chain_meta(conn, ctx, chain_id)?;
        let strategy_label = meta.and_then(|m| m.strategy_type);
        let first = members[0];

        let group_id = Uuid::new_v4().to_string();
        groups::insert_group(
            conn,
            ctx,
            &groups::NewGroup {
                group_id: &group_id,
                account_number: &first.account_number,
                underlying: &first.underlying,
                strategy_label: strategy_label.as_deref(),
                source_chain_id: Some(chain_id),
            },
        )?;
        for lot in members {
            groups::link_lot(conn, ctx, &group_id, &lot.transaction_id)?;
        }
        groups::refresh_group_status(conn, ctx, &group_id)?;
        created += 1;
    }

    created += seed_ungrouped(conn, ctx)?;

    info!(groups = created, "seeded position groups");
    Ok(created)
}

/// Incremental seed: attach lots that are not yet in any group. New lots of
/// an existing chain land in that chain's group; lots of a new chain join an
/// OPEN group for the same `(account, underlying)` when one exists, so a
/// fresh round of ACAT shares or a rolled leg stays inside the named
/// strategy group instead of spawning a duplicate.
pub fn seed_new_lots_into_groups(conn: &Connection, ctx: &Ctx) -> Result<usize> {
    let unassigned = lots::get_unassigned_lots(conn, ctx)?;
    if unassigned.is_empty() {
        groups::refresh_all_group_statuses(conn, ctx)?;
        return Ok(0);
    }

    if groups::group_count(conn, ctx)? == 0 {
        return seed_position_groups(conn, ctx);
    }

    let mut assigned = 0;

    for lot in &unassigned {
        let group_id = match &lot.chain_id {
            Some(chain_id) => {
                if let Some(gid) = groups::find_group_by_source_chain(conn, ctx, chain_id)? {
                    gid
                } else if let Some(gid) =
                    groups::find_open_group(conn, ctx, &lot.account_number, &lot.underlying)?
                {
                    gid
                } else {
                    let meta = chains::get_chain_meta(conn, ctx, chain_id)?;
                    let strategy_label = meta.and_then(|m| m.strategy_type);
                    let gid = Uuid::new_v4().to_string();
                    groups::insert_group(
                        conn,
                        ctx,
                        &groups::NewGroup {
                            group_id: &gid,
                            account_number: &lot.account_number,
                            underlying: &lot.underlying,
                            strategy_label: strategy_label.as_deref(),
                            source_chain_id: Some(chain_id),
                        },
                    )?;
                    gid
                }
            }
            None => ungrouped_group(conn, ctx, &lot.account_number, &lot.underlying)?,
        };

        groups::link_lot(conn, ctx, &group_id, &lot.transaction_id)?;
        assigned += 1;
    }

    groups::refresh_all_group_statuses(conn, ctx)?;

    info!(lots = assigned, "seeded new lots into position groups");
    Ok(assigned)
}

/// Rebind groups whose source chain was renumbered by Stage 4 to the
/// earliest lot's current chain, refreshing the label from that chain.
pub fn reconcile_stale_groups(conn: &Connection, ctx: &Ctx) -> Result<usize> {
    let mut reconciled = 0;

    for (group_id, old_chain) in groups::stale_source_groups(conn, ctx)? {
        let Some(new_chain) = groups::earliest_chain_for_group(conn, ctx, &group_id)? else {
            continue;
        };
        let Some(meta) = chains::get_chain_meta(conn, ctx, &new_chain)? else {
            continue;
        };
        groups::rebind_group(
            conn,
            ctx,
            &group_id,
            &new_chain,
            &meta.underlying,
            meta.strategy_type.as_deref(),
        )?;
        groups::refresh_group_status(conn, ctx, &group_id)?;
        reconciled += 1;
        info!(group = %group_id, old = %old_chain, new = %new_chain, "reconciled stale group");
    }

    if reconciled > 0 {
        info!(groups = reconciled, "reconciled stale position groups");
    }
    Ok(reconciled)
}

fn seed_ungrouped(conn: &Connection, ctx: &Ctx) -> Result<usize> {
    let mut created = 0;
    let unassigned = lots::get_unassigned_lots(conn, ctx)?;
    for lot in unassigned.iter().filter(|l| l.chain_id.is_none()) {
        let existing = groups::find_ungrouped_group(conn, ctx, &lot.account_number, &lot.underlying)?;
        let group_id = match existing {
            Some(gid) => gid,
            None => {
                let gid = Uuid::new_v4().to_string();
                groups::insert_group(
                    conn,
                    ctx,
                    &groups::NewGroup {
                        group_id: &gid,
                        account_number: &lot.account_number,
                        underlying: &lot.underlying,
                        strategy_label: Some(UNGROUPED_LABEL),
                        source_chain_id: None,
                    },
                )?;
                created += 1;
                gid
            }
        };
        groups::link_lot(conn, ctx, &group_id, &lot.transaction_id)?;
        groups::refresh_group_status(conn, ctx, &group_id)?;
    }
    Ok(created)
}

fn ungrouped_group(
    conn: &Connection,
    ctx: &Ctx,
    account_number: &str,
    underlying: &str,
) -> Result<String> {
    if let Some(gid) = groups::find_ungrouped_group(conn, ctx, account_number, underlying)? {
        return Ok(gid);
    }
    let gid = Uuid::new_v4().to_string();
    groups::insert_group(
        conn,
        ctx,
        &groups::NewGroup {
            group_id: &gid,
            account_number,
            underlying,
            strategy_label: Some(UNGROUPED_LABEL),
            source_chain_id: None,
        },
    )?;
    Ok(gid)
}
