//! Reconciliation: position-by-position comparison between the broker's
//! live snapshot and the ledger's open lots.
//!
//! Categories: MATCHED (account+symbol+quantity agree), QUANTITY_MISMATCH,
//! UNLINKED (broker has it, ledger doesn't), STALE (ledger has it, broker
//! doesn't). Stale lots are auto-closed and their groups refreshed.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::Ctx;
use crate::store::{groups, lots};

/// One position from the broker's live snapshot. `quantity` is signed
/// (negative for short).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub account_number: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument_type: Option<String>,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuantityMismatch {
    pub account_number: String,
    pub symbol: String,
    pub broker_quantity: Decimal,
    pub ledger_quantity: Decimal,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnlinkedPosition {
    pub account_number: String,
    pub symbol: String,
    pub quantity: Decimal,
    pub underlying: Option<String>,
    pub instrument_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StalePosition {
    pub account_number: String,
    pub symbol: String,
    pub ledger_quantity: Decimal,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub total: usize,
    pub matched: usize,
    pub quantity_mismatch: Vec<QuantityMismatch>,
    pub unlinked: Vec<UnlinkedPosition>,
    pub stale: Vec<StalePosition>,
    pub auto_closed_groups: Vec<String>,
}

/// Compare the broker snapshot against the ledger's open lots and auto-close
/// what the broker no longer holds.
pub fn reconcile_positions(
    conn: &Connection,
    ctx: &Ctx,
    broker_positions: &[BrokerPosition],
) -> Result<ReconcileSummary> {
    let broker_by_key: HashMap<(String, String), &BrokerPosition> = broker_positions
        .iter()
        .map(|p| ((p.account_number.clone(), p.symbol.trim().to_string()), p))
        .collect();

    let ledger_positions = lots::open_quantity_by_position(conn, ctx)?;
    let ledger_by_key: HashMap<(String, String), &lots::OpenPosition> = ledger_positions
        .iter()
        .map(|p| ((p.account_number.clone(), p.symbol.trim().to_string()), p))
        .collect();

    let mut summary = ReconcileSummary::default();

    for (key, broker) in &broker_by_key {
        match ledger_by_key.get(key) {
            Some(ledger) => {
                if ledger.quantity == broker.quantity {
                    summary.matched += 1;
                } else {
                    summary.quantity_mismatch.push(QuantityMismatch {
                        account_number: key.0.clone(),
                        symbol: key.1.clone(),
                        broker_quantity: broker.quantity,
                        ledger_quantity: ledger.quantity,
                        group_id: ledger.group_id.clone(),
                    });
                }
            }
            None => summary.unlinked.push(UnlinkedPosition {
                account_number: key.0.clone(),
                symbol: key.1.clone(),
                quantity: broker.quantity,
                underlying: broker.underlying.clone(),
                instrument_type: broker.instrument_type.clone(),
            }),
        }
    }

    for (key, ledger) in &ledger_by_key {
        if !broker_by_key.contains_key(key) {
            summary.stale.push(StalePosition {
                account_number: key.0.clone(),
                symbol: key.1.clone(),
                ledger_quantity: ledger.quantity,
                group_id: ledger.group_id.clone(),
            });
        }
    }

    // Auto-close stale lots, but never for a group that also holds matched
    // positions (a partial mismatch is surfaced, not destroyed).
    if !summary.stale.is_empty() {
        let matched_groups: HashSet<String> = ledger_by_key
            .iter()
            .filter(|(key, _)| broker_by_key.contains_key(*key))
            .filter_map(|(_, ledger)| ledger.group_id.clone())
            .collect();
        let stale_groups: HashSet<String> = summary
            .stale
            .iter()
            .filter_map(|s| s.group_id.clone())
            .collect();

        for group_id in stale_groups.difference(&matched_groups) {
            let open_txs = groups::open_lot_transactions_for_group(conn, ctx, group_id)?;
            if open_txs.is_empty() {
                continue;
            }
            lots::force_close_lots(conn, ctx, &open_txs)?;
            groups::refresh_group_status(conn, ctx, group_id)?;
            summary.auto_closed_groups.push(group_id.clone());
            info!(group = %group_id, lots = open_txs.len(), "auto-closed stale lots");
        }
    }

    // Ghost groups: still marked open, no open lots, and the broker has
    // nothing left under that underlying. Refreshing closes them.
    let mut broker_underlyings: HashMap<String, HashSet<String>> = HashMap::new();
    for pos in broker_positions {
        let underlying = pos
            .underlying
            .clone()
            .unwrap_or_else(|| pos.symbol.trim().to_string());
        broker_underlyings
            .entry(pos.account_number.clone())
            .or_default()
            .insert(underlying);
    }

    let auto_closed: HashSet<String> = summary.auto_closed_groups.iter().cloned().collect();
    for group in groups::open_groups(conn, ctx)? {
        if auto_closed.contains(&group.group_id) {
            continue;
        }
        let has_open_lots =
            !groups::open_lot_transactions_for_group(conn, ctx, &group.group_id)?.is_empty();
        if has_open_lots {
            continue;
        }
        let broker_has = broker_underlyings
            .get(&group.account_number)
            .is_some_and(|set| set.contains(&group.underlying));
        if !broker_has {
            groups::refresh_group_status(conn, ctx, &group.group_id)?;
            summary.auto_closed_groups.push(group.group_id.clone());
            info!(group = %group.group_id, underlying = %group.underlying, "closed ghost group");
        }
    }

    // Stale entries resolved by auto-closing drop out of the report.
    let auto_closed: HashSet<String> = summary.auto_closed_groups.iter().cloned().collect();
    summary
        .stale
        .retain(|s| s.group_id.as_ref().is_none_or(|g| !auto_closed.contains(g)));

    summary.total = summary.matched
        + summary.quantity_mismatch.len()
        + summary.unlinked.len()
        + summary.stale.len();

    info!(
        matched = summary.matched,
        mismatched = summary.quantity_mismatch.len(),
        unlinked = summary.unlinked.len(),
        stale = summary.stale.len(),
        auto_closed = summary.auto_closed_groups.len(),
        "reconciliation complete"
    );

    Ok(summary)
}
