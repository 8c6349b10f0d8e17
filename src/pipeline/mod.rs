//! The transaction-to-chain pipeline.
//!
//! [`reprocess`] composes Stages 2-6 into one call running inside a single
//! DB transaction per user: order assembly, the lot ledger, graph-based
//! chain derivation, strategy-labelled cache refresh, group persistence,
//! and the equity-netting cleanup.

pub mod assemble;
pub mod chain_graph;
pub mod groups;
pub mod ledger;
pub mod netting;

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use crate::context::Ctx;
use crate::model::RawTransaction;
use crate::model::symbol::underlying_of;
use crate::store::{chains, groups as group_store, lots};

pub use assemble::{Assembly, assemble};

/// Counts from a full pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineResult {
    pub orders_assembled: usize,
    pub chains_derived: usize,
    pub groups_processed: usize,
    pub equity_lots_netted: usize,
}

/// Run the full processing pipeline over raw transactions.
///
/// With `affected_underlyings` set, only those symbols' lots, chains, and
/// groups are rebuilt (incremental mode); otherwise the user's whole history
/// is reprocessed. Aborts atomically: any failure rolls back the enclosing
/// transaction, and re-running on the same inputs yields the same state.
pub fn reprocess(
    conn: &mut Connection,
    ctx: &Ctx,
    raw_transactions: &[RawTransaction],
    affected_underlyings: Option<&[String]>,
) -> Result<PipelineResult> {
    if raw_transactions.is_empty() {
        info!("no transactions to process");
        return Ok(PipelineResult::default());
    }

    let tx = conn.transaction()?;
    ctx.ensure_user(&tx)?;

    // Stage 3 state is rebuilt from scratch each run.
    lots::clear_lots(&tx, ctx, affected_underlyings)?;
    match affected_underlyings {
        Some(list) => info!(underlyings = list.len(), "cleared lots for incremental reprocess"),
        None => info!("cleared lots for full reprocess"),
    }

    let scoped: Vec<RawTransaction>;
    let rows: &[RawTransaction] = match affected_underlyings {
        Some(list) => {
            scoped = raw_transactions
                .iter()
                .filter(|t| {
                    let underlying = t
                        .underlying_symbol
                        .as_deref()
                        .filter(|u| !u.is_empty())
                        .unwrap_or_else(|| underlying_of(t.symbol.as_deref().unwrap_or_default()));
                    list.iter().any(|u| u == underlying)
                })
                .cloned()
                .collect();
            &scoped
        }
        None => raw_transactions,
    };

    let assembly = assemble(rows);
    let orders_assembled = assembly.orders.len();
    info!(orders = orders_assembled, "stage 2: assembled orders");

    ledger::process_lots(&tx, ctx, &assembly)?;
    info!("stage 3: processed lots");

    let derived = chain_graph::derive_chains(&tx, ctx, &assembly.orders)?;
    info!(chains = derived.len(), "stage 4: derived chains");

    // Refine provisional lot chain ids to the graph-derived ones before the
    // cache and groups read them.
    for chain in &derived {
        let member_ids: Vec<String> = chain.orders.iter().map(|o| o.order_id.clone()).collect();
        lots::assign_chain_to_orders(&tx, ctx, &chain.chain_id, &member_ids)?;
    }

    chains::update_chain_cache(&tx, ctx, &derived, affected_underlyings)?;

    let groups_processed = groups::seed_new_lots_into_groups(&tx, ctx)?;
    groups::reconcile_stale_groups(&tx, ctx)?;
    info!(groups = groups_processed, "stage 6: processed groups");

    let equity_lots_netted = netting::net_opposing_equity_lots(&tx, ctx)?;
    if equity_lots_netted > 0 {
        group_store::refresh_all_group_statuses(&tx, ctx)?;
        info!(netted = equity_lots_netted, "equity netting closed lot sides");
    }

    tx.commit()?;

    Ok(PipelineResult {
        orders_assembled,
        chains_derived: derived.len(),
        groups_processed,
        equity_lots_netted,
    })
}
