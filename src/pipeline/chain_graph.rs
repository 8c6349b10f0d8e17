//! Stage 4 — chain derivation.
//!
//! Builds chains after all lots exist by running connected components over
//! order ids: one edge per lot→closing pair, one edge per derived lot back
//! to its parent's chain. Read-only with respect to its inputs; the result
//! replaces the cached chains.

use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use petgraph::unionfind::UnionFind;
use rusqlite::Connection;

use crate::context::Ctx;
use crate::model::{Chain, ChainStatus, ClosingType, Lot, LotClosing, Order};
use crate::pipeline::netting::EQUITY_NETTING_ORDER_ID;
use crate::store::lots;

/// Pure connected-components pass: edges in, `{root → members}` out.
pub fn build_order_graph(
    lot_edges: &[(String, String)],
    derived_edges: &[(String, String)],
) -> HashMap<String, BTreeSet<String>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut nodes: Vec<&str> = Vec::new();

    // Interning pass so the union-find can run over dense indices.
    for (a, b) in lot_edges.iter().chain(derived_edges.iter()) {
        for id in [a.as_str(), b.as_str()] {
            if !index.contains_key(id) {
                index.insert(id, nodes.len());
                nodes.push(id);
            }
        }
    }

    let mut uf: UnionFind<usize> = UnionFind::new(nodes.len());
    for (a, b) in lot_edges.iter().chain(derived_edges.iter()) {
        uf.union(index[a.as_str()], index[b.as_str()]);
    }

    let mut components: HashMap<String, BTreeSet<String>> = HashMap::new();
    for (id, &idx) in &index {
        let root = nodes[uf.find_mut(idx)];
        components
            .entry(root.to_string())
            .or_default()
            .insert((*id).to_string());
    }
    components
}

/// Derive chains from persisted lots and closings, mapping components back
/// onto the assembled orders. Orders touched by no edge become singleton
/// chains.
pub fn derive_chains(conn: &Connection, ctx: &Ctx, orders: &[Order]) -> Result<Vec<Chain>> {
    let all_lots = lots::get_all_lots(conn, ctx)?;
    let all_closings = lots::get_all_closings(conn, ctx)?;

    let lot_by_id: HashMap<i64, &Lot> = all_lots.iter().map(|l| (l.id, l)).collect();

    // Lot edges: opening order → closing order. Synthetic netting closings
    // are not order links and would fuse unrelated chains.
    let mut lot_edges: Vec<(String, String)> = Vec::new();
    for closing in &all_closings {
        if closing.closing_order_id == EQUITY_NETTING_ORDER_ID {
            continue;
        }
        let Some(lot) = lot_by_id.get(&closing.lot_id) else {
            continue;
        };
        if let Some(opening) = &lot.opening_order_id {
            lot_edges.push((opening.clone(), closing.closing_order_id.clone()));
        }
    }

    // Derived-lot edges: the stock side of an assignment has no opening
    // order, so bridge through the parent's assignment closing instead.
    let mut derived_edges: Vec<(String, String)> = Vec::new();
    for lot in &all_lots {
        let Some(parent_id) = lot.derived_from_lot_id else {
            continue;
        };
        let Some(parent) = lot_by_id.get(&parent_id) else {
            continue;
        };
        let derived_opener = lot.opening_order_id.clone().or_else(|| {
            all_closings
                .iter()
                .find(|c| c.lot_id == parent_id && c.resulting_lot_id == Some(lot.id))
                .map(|c| c.closing_order_id.clone())
        });
        if let (Some(derived), Some(parent_opener)) = (derived_opener, &parent.opening_order_id) {
            derived_edges.push((derived, parent_opener.clone()));
        }
    }

    let components = build_order_graph(&lot_edges, &derived_edges);

    let order_map: HashMap<&str, &Order> = orders.iter().map(|o| (o.order_id.as_str(), o)).collect();

    let mut lots_by_order: HashMap<&str, Vec<&Lot>> = HashMap::new();
    let mut children_by_parent: HashMap<i64, Vec<&Lot>> = HashMap::new();
    for lot in &all_lots {
        if let Some(opening) = &lot.opening_order_id {
            lots_by_order.entry(opening.as_str()).or_default().push(lot);
        }
        if let Some(parent) = lot.derived_from_lot_id {
            children_by_parent.entry(parent).or_default().push(lot);
        }
    }
    let mut closings_by_lot: HashMap<i64, Vec<&LotClosing>> = HashMap::new();
    for closing in &all_closings {
        closings_by_lot.entry(closing.lot_id).or_default().push(closing);
    }

    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut chains = Vec::new();

    let mut component_list: Vec<(&String, &BTreeSet<String>)> = components.iter().collect();
    component_list.sort_by_key(|(root, _)| root.as_str());
    for (_root, members) in component_list {
        let mut component_orders: Vec<&Order> = members
            .iter()
            .filter_map(|id| order_map.get(id.as_str()).copied())
            .collect();
        if component_orders.is_empty() {
            continue;
        }
        component_orders.sort_by(|a, b| {
            (a.executed_at, a.order_id.as_str()).cmp(&(b.executed_at, b.order_id.as_str()))
        });
        for order in &component_orders {
            used.insert(order.order_id.clone());
        }

        let earliest = component_orders[0];
        let chain_id = Chain::make_id(&earliest.underlying, earliest.executed_at, &earliest.order_id);
        let status = determine_status(
            members,
            &lots_by_order,
            &children_by_parent,
            &closings_by_lot,
        );

        chains.push(Chain {
            chain_id,
            account_number: earliest.account_number.clone(),
            underlying: earliest.underlying.clone(),
            orders: component_orders.into_iter().cloned().collect(),
            status,
        });
    }

    // Orphan orders → singleton chains.
    for order in orders {
        if used.contains(&order.order_id) {
            continue;
        }
        let chain_id = Chain::make_id(&order.underlying, order.executed_at, &order.order_id);
        let members = BTreeSet::from([order.order_id.clone()]);
        let status = determine_status(
            &members,
            &lots_by_order,
            &children_by_parent,
            &closings_by_lot,
        );
        chains.push(Chain {
            chain_id,
            account_number: order.account_number.clone(),
            underlying: order.underlying.clone(),
            orders: vec![order.clone()],
            status,
        });
    }

    Ok(chains)
}

/// A chain is ASSIGNED while it still holds open quantity and any of its
/// lots closed by assignment; OPEN with open quantity otherwise; CLOSED
/// when everything is flat.
fn determine_status(
    members: &BTreeSet<String>,
    lots_by_order: &HashMap<&str, Vec<&Lot>>,
    children_by_parent: &HashMap<i64, Vec<&Lot>>,
    closings_by_lot: &HashMap<i64, Vec<&LotClosing>>,
) -> ChainStatus {
    let mut chain_lots: Vec<&Lot> = Vec::new();
    for member in members {
        if let Some(lots) = lots_by_order.get(member.as_str()) {
            chain_lots.extend(lots.iter().copied());
        }
    }
    let direct_ids: Vec<i64> = chain_lots.iter().map(|l| l.id).collect();
    for id in direct_ids {
        if let Some(children) = children_by_parent.get(&id) {
            chain_lots.extend(children.iter().copied());
        }
    }

    if chain_lots.is_empty() {
        return ChainStatus::Open;
    }

    let has_open = chain_lots
        .iter()
        .any(|l| l.remaining_quantity != rust_decimal::Decimal::ZERO);
    if !has_open {
        return ChainStatus::Closed;
    }

    let has_assignment = chain_lots.iter().any(|l| {
        closings_by_lot
            .get(&l.id)
            .is_some_and(|cs| cs.iter().any(|c| c.closing_type == ClosingType::Assignment))
    });

    if has_assignment {
        ChainStatus::Assigned
    } else {
        ChainStatus::Open
    }
}
