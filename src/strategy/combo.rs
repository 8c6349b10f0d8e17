//! Combo patterns: equity-containing structures and option-only combos.

use rust_decimal::Decimal;

use super::registry::{CASH_SECURED_PUT, COLLAR, COVERED_CALL, JADE_LIZARD};
use super::types::Leg;

/// Equity-containing combos: Covered Call, Collar.
pub fn match_equity_combo(equity_legs: &[Leg], option_legs: &[Leg]) -> Option<&'static str> {
    if equity_legs.len() != 1 {
        return None;
    }
    let equity = &equity_legs[0];
    if !equity.is_long() {
        return None;
    }

    match option_legs {
        [option] => match_covered_call(equity, option),
        [_, _] => match_collar(option_legs),
        _ => None,
    }
}

/// Option-only combos tried before the generic shapes: Cash Secured Put and
/// Jade Lizard.
pub fn match_option_combo(option_legs: &[Leg]) -> Option<&'static str> {
    match option_legs {
        [leg] if leg.is_put() && leg.is_short() => Some(CASH_SECURED_PUT),
        [_, _, _] => match_jade_lizard(option_legs),
        _ => None,
    }
}

/// Covered Call: long shares covering short calls at the 100:1 ratio.
fn match_covered_call(equity: &Leg, option: &Leg) -> Option<&'static str> {
    if option.is_call()
        && option.is_short()
        && equity.quantity >= option.quantity * Decimal::ONE_HUNDRED
    {
        return Some(COVERED_CALL);
    }
    None
}

/// Collar: long shares + short call + long put, any strikes.
fn match_collar(option_legs: &[Leg]) -> Option<&'static str> {
    let calls: Vec<&Leg> = option_legs.iter().filter(|l| l.is_call()).collect();
    let puts: Vec<&Leg> = option_legs.iter().filter(|l| l.is_put()).collect();

    if let ([call], [put]) = (calls.as_slice(), puts.as_slice()) {
        if call.is_short() && put.is_long() {
            return Some(COLLAR);
        }
    }
    None
}

/// Jade Lizard: short put + short call + long call above it (a bear call
/// spread financing the put side, no upside risk).
fn match_jade_lizard(option_legs: &[Leg]) -> Option<&'static str> {
    let puts: Vec<&Leg> = option_legs.iter().filter(|l| l.is_put()).collect();
    let mut calls: Vec<&Leg> = option_legs.iter().filter(|l| l.is_call()).collect();

    let [put] = puts.as_slice() else {
        return None;
    };
    if !put.is_short() || calls.len() != 2 {
        return None;
    }

    calls.sort_by_key(|l| l.strike);
    let (low_call, high_call) = (calls[0], calls[1]);

    if low_call.is_short() && high_call.is_long() && high_call.strike > low_call.strike {
        return Some(JADE_LIZARD);
    }
    None
}
