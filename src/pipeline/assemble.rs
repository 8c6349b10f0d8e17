//! Stage 2 — order assembly.
//!
//! Pure functions: raw transaction rows in, classified [`Order`]s out. No
//! DB access and no side effects, so the whole stage is unit-testable on
//! literal inputs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::model::symbol::{self, parse_occ};
use crate::model::{Action, InstrumentType, Order, OrderType, RawTransaction, Transaction};

/// Output of [`assemble`]: classified orders plus the stock rows that were
/// separated out for assignment/exercise matching in Stage 3.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub orders: Vec<Order>,
    pub assignment_stock_rows: Vec<RawTransaction>,
}

/// Top-level entry point: preprocess → group → normalize → classify → sort.
pub fn assemble(raw: &[RawTransaction]) -> Assembly {
    let (transactions, assignment_stock_rows) = preprocess(raw);
    let grouped = group_transactions(transactions);
    let mut orders = create_orders(grouped);
    orders.sort_by_key(|o| o.executed_at);

    Assembly {
        orders,
        assignment_stock_rows,
    }
}

struct SymbolChangeOverride {
    order_id: String,
    underlying: String,
}

/// Pair same-day Symbol Change legs so the close side of the old symbol and
/// the open side of the new symbol share one synthetic order id each.
fn symbol_change_overrides(raw: &[RawTransaction]) -> HashMap<String, SymbolChangeOverride> {
    let mut groups: HashMap<(String, String, String), Vec<&RawTransaction>> = HashMap::new();
    for tx in raw.iter().filter(|t| t.is_symbol_change()) {
        let account = tx.account_number.clone();
        let old_under = tx.underlying_symbol.clone().unwrap_or_default();
        let date = tx.executed_at.format("%Y-%m-%d").to_string();
        groups.entry((account, old_under, date)).or_default().push(tx);
    }

    let mut overrides = HashMap::new();
    for ((account, old_under, date), txs) in groups {
        let close_txs: Vec<_> = txs
            .iter()
            .filter(|t| t.action.as_deref().unwrap_or_default().contains("TO_CLOSE"))
            .collect();
        let open_txs: Vec<_> = txs
            .iter()
            .filter(|t| t.action.as_deref().unwrap_or_default().contains("TO_OPEN"))
            .collect();

        // The new underlying comes off the open legs' symbol.
        let new_under = open_txs
            .first()
            .and_then(|t| t.symbol.as_deref())
            .map(symbol::underlying_of)
            .unwrap_or(old_under.as_str())
            .to_string();

        let close_oid = format!("SYMCHG_CLOSE_{account}_{old_under}_{date}");
        let open_oid = format!("SYMCHG_OPEN_{account}_{new_under}_{date}");

        for tx in &close_txs {
            overrides.insert(
                tx.id.clone(),
                SymbolChangeOverride {
                    order_id: close_oid.clone(),
                    underlying: old_under.clone(),
                },
            );
        }
        for tx in &open_txs {
            overrides.insert(
                tx.id.clone(),
                SymbolChangeOverride {
                    order_id: open_oid.clone(),
                    underlying: new_under.clone(),
                },
            );
        }

        if !close_txs.is_empty() || !open_txs.is_empty() {
            info!(
                old = %old_under,
                new = %new_under,
                close_legs = close_txs.len(),
                open_legs = open_txs.len(),
                "paired symbol change"
            );
        }
    }
    overrides
}

/// Convert raw rows to typed transactions, separating out the stock side of
/// assignments/exercises (equity rows with an action but no order id).
fn preprocess(raw: &[RawTransaction]) -> (Vec<Transaction>, Vec<RawTransaction>) {
    let overrides = symbol_change_overrides(raw);

    let mut transactions = Vec::new();
    let mut assignment_stock = Vec::new();

    for tx in raw {
        let Some(symbol) = tx.symbol.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };

        // Rows with no action are only kept when a system sub-type explains
        // them (expiration/assignment/exercise/symbol change).
        let sub_type = tx.sub_type_upper();
        if tx.action.is_none()
            && !sub_type.contains("ASSIGNMENT")
            && !sub_type.contains("EXERCISE")
            && !sub_type.contains("EXPIR")
        {
            continue;
        }

        // The stock side of an assignment/exercise is not an ordinary trade:
        // no order id, but an action. Stage 3 matches these to option legs.
        if tx.is_equity() && tx.order_id.is_none() && tx.action.is_some() && !tx.is_symbol_change()
        {
            assignment_stock.push(tx.clone());
            continue;
        }

        let sc_override = overrides.get(&tx.id);
        let order_id = match sc_override {
            Some(o) => o.order_id.clone(),
            None => match &tx.order_id {
                Some(oid) => oid.clone(),
                None => synthetic_order_id(tx, symbol),
            },
        };

        let instrument_type =
            InstrumentType::parse(tx.instrument_type.as_deref().unwrap_or_default());
        let option = if instrument_type == InstrumentType::EquityOption {
            let parsed = parse_occ(symbol);
            if parsed.is_none() {
                warn!(symbol, "unparseable option symbol; leaving option fields null");
            }
            parsed
        } else {
            None
        };

        let underlying = match sc_override {
            Some(o) => o.underlying.clone(),
            None => tx
                .underlying_symbol
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| symbol::underlying_of(symbol).to_string()),
        };

        transactions.push(Transaction {
            id: tx.id.clone(),
            account_number: tx.account_number.clone(),
            order_id,
            symbol: symbol.to_string(),
            underlying,
            action: tx.action.as_deref().and_then(Action::parse),
            quantity: tx.quantity,
            price: tx.price.unwrap_or_default(),
            executed_at: tx.executed_at,
            transaction_type: tx.transaction_type.clone().unwrap_or_default(),
            sub_type: tx.transaction_sub_type.clone().unwrap_or_default(),
            instrument_type,
            option,
            commission: tx.commission,
            regulatory_fees: tx.regulatory_fees,
            clearing_fees: tx.clearing_fees,
            value: tx.value,
        });
    }

    (transactions, assignment_stock)
}

/// Deterministic id for system events (expirations etc.) that arrive with
/// no broker order id.
fn synthetic_order_id(tx: &RawTransaction, symbol: &str) -> String {
    let id = format!(
        "SYSTEM_{}_{}_{}_{}",
        tx.transaction_sub_type.as_deref().unwrap_or("UNKNOWN"),
        tx.executed_at.to_rfc3339(),
        symbol,
        tx.action.as_deref().unwrap_or_default(),
    );
    id.replace(' ', "_").replace(':', "")
}

type GroupKey = (String, String, String);

/// Group by `(account, underlying, order_id)`, preserving first-seen order
/// so downstream sorting is deterministic on timestamp ties.
fn group_transactions(transactions: Vec<Transaction>) -> Vec<(GroupKey, Vec<Transaction>)> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<(GroupKey, Vec<Transaction>)> = Vec::new();

    for tx in transactions {
        let underlying = symbol::underlying_of(&tx.underlying).to_string();
        let key = (tx.account_number.clone(), underlying, tx.order_id.clone());
        match index.get(&key) {
            Some(&i) => groups[i].1.push(tx),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![tx]));
            }
        }
    }
    groups
}

/// Aggregate fills with identical `(action, symbol, option, price)` inside
/// one order. Different-price fills stay separate.
fn normalize_fills(transactions: Vec<Transaction>) -> Vec<Transaction> {
    type FillKey = (Option<Action>, String, String);
    let mut index: HashMap<FillKey, usize> = HashMap::new();
    let mut groups: Vec<Vec<Transaction>> = Vec::new();

    for tx in transactions {
        // Option terms are part of the symbol, so (action, symbol, price)
        // is sufficient; price keys as a normalized decimal string.
        let key = (tx.action, tx.symbol.clone(), tx.price.normalize().to_string());
        match index.get(&key) {
            Some(&i) => groups[i].push(tx),
            None => {
                index.insert(key, groups.len());
                groups.push(vec![tx]);
            }
        }
    }

    groups
        .into_iter()
        .map(|mut group| {
            if group.len() == 1 {
                return group.swap_remove(0);
            }
            let quantity: Decimal = group.iter().map(|t| t.quantity).sum();
            let executed_at: DateTime<Utc> =
                group.iter().map(|t| t.executed_at).min().unwrap_or_else(Utc::now);
            let ids: Vec<&str> = group.iter().map(|t| t.id.as_str()).collect();
            let id = ids.join(",");
            let commission: Decimal = group.iter().map(|t| t.commission).sum();
            let regulatory_fees: Decimal = group.iter().map(|t| t.regulatory_fees).sum();
            let clearing_fees: Decimal = group.iter().map(|t| t.clearing_fees).sum();
            let value: Decimal = group.iter().map(|t| t.value).sum();

            let mut merged = group.swap_remove(0);
            merged.id = id;
            merged.quantity = quantity;
            merged.executed_at = executed_at;
            merged.commission = commission;
            merged.regulatory_fees = regulatory_fees;
            merged.clearing_fees = clearing_fees;
            merged.value = value;
            merged
        })
        .collect()
}

/// Classify by what the normalized legs do to positions.
pub fn classify_order(transactions: &[Transaction]) -> OrderType {
    let has_opening = transactions.iter().any(|t| t.is_opening());
    let has_closing = transactions.iter().any(|t| t.is_closing());

    match (has_opening, has_closing) {
        (true, false) => OrderType::Opening,
        (false, true) => OrderType::Closing,
        (true, true) => OrderType::Rolling,
        (false, false) => {
            warn!(
                actions = ?transactions.iter().map(|t| t.action).collect::<Vec<_>>(),
                "could not classify order; treating as CLOSING"
            );
            OrderType::Closing
        }
    }
}

fn create_orders(grouped: Vec<(GroupKey, Vec<Transaction>)>) -> Vec<Order> {
    let mut orders = Vec::with_capacity(grouped.len());
    for ((account, underlying, order_id), transactions) in grouped {
        let normalized = normalize_fills(transactions);
        let order_type = classify_order(&normalized);
        let executed_at = normalized
            .iter()
            .map(|t| t.executed_at)
            .min()
            .unwrap_or_else(Utc::now);

        orders.push(Order {
            order_id,
            account_number: account,
            underlying,
            executed_at,
            order_type,
            transactions: normalized,
        });
    }
    orders
}
