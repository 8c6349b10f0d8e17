//! Stage 5 — strategy recognition.
//!
//! Pattern-matches a set of legs to a named option strategy. Pure functions
//! with no DB access; patterns are tried in a fixed dispatch order and the
//! first match wins.

mod adapters;
mod calendar;
mod combo;
mod multi;
pub mod registry;
mod single;
mod vertical;
pub mod types;

use std::collections::HashSet;

use chrono::NaiveDate;

pub use adapters::lots_to_legs;
pub use types::{Bias, CreditDebit, Direction, Leg, LegInstrument, StrategyDef, StrategyResult};

/// Recognize the strategy formed by a set of legs.
///
/// Dispatch order:
/// 1. equity-containing combos (Covered Call, Collar)
/// 2. option-only combos (Cash Secured Put, Jade Lizard)
/// 3. same-expiration groups (iron condor/butterfly, straddles, strangles)
/// 4. cross-expiration 2-leg, same type (calendar, diagonal, PMCC)
/// 5. same-expiration verticals
/// 6. singletons
/// 7. `Custom (N-leg)` fallback with confidence 0
pub fn recognize(legs: &[Leg]) -> StrategyResult {
    if legs.is_empty() {
        return custom_result(0);
    }

    let equity_legs: Vec<Leg> = legs.iter().filter(|l| !l.is_option()).cloned().collect();
    let option_legs: Vec<Leg> = legs.iter().filter(|l| l.is_option()).cloned().collect();

    if !equity_legs.is_empty() {
        if let Some(name) = combo::match_equity_combo(&equity_legs, &option_legs) {
            return registry_result(name);
        }
    }

    if equity_legs.is_empty() && !option_legs.is_empty() {
        if let Some(name) = combo::match_option_combo(&option_legs) {
            return registry_result(name);
        }
    }

    if !option_legs.is_empty() {
        let expirations: HashSet<Option<NaiveDate>> =
            option_legs.iter().map(|l| l.expiration).collect();

        if expirations.len() == 1 {
            if let Some(name) = multi::match_multi(&option_legs) {
                return registry_result(name);
            }
            if option_legs.len() == 2
                && option_legs[0].option_type == option_legs[1].option_type
            {
                if let Some(name) = vertical::match_vertical(&option_legs) {
                    return registry_result(name);
                }
            }
        } else if expirations.len() == 2 && option_legs.len() == 2 {
            if option_legs[0].option_type == option_legs[1].option_type {
                if let Some(name) = calendar::match_calendar(&option_legs) {
                    return registry_result(name);
                }
            }
        }
    }

    if let [leg] = legs {
        if let Some(name) = single::match_single(leg) {
            return registry_result(name);
        }
    }

    custom_result(legs.len())
}

fn registry_result(name: &str) -> StrategyResult {
    match registry::lookup(name) {
        Some(def) => StrategyResult {
            name: def.name.to_string(),
            direction: def.direction,
            credit_debit: def.credit_debit,
            leg_count: def.leg_count,
            confidence: 1.0,
        },
        // Matched but unregistered: recognized with reduced confidence.
        None => StrategyResult {
            name: name.to_string(),
            direction: None,
            credit_debit: None,
            leg_count: 0,
            confidence: 0.5,
        },
    }
}

fn custom_result(leg_count: usize) -> StrategyResult {
    StrategyResult {
        name: format!("Custom ({leg_count}-leg)"),
        direction: None,
        credit_debit: None,
        leg_count: leg_count as u8,
        confidence: 0.0,
    }
}
