//! Same-expiration 2-leg verticals.

use super::registry::{BEAR_CALL_SPREAD, BEAR_PUT_SPREAD, BULL_CALL_SPREAD, BULL_PUT_SPREAD};
use super::types::Leg;

/// Two option legs, same type, same expiration, distinct strikes.
pub fn match_vertical(legs: &[Leg]) -> Option<&'static str> {
    let [a, b] = legs else {
        return None;
    };
    if !a.is_option() || !b.is_option() {
        return None;
    }
    if a.option_type != b.option_type || a.expiration != b.expiration || a.strike == b.strike {
        return None;
    }

    let (low, high) = if a.strike < b.strike { (a, b) } else { (b, a) };

    if a.is_put() {
        if low.is_long() && high.is_short() {
            return Some(BULL_PUT_SPREAD); // credit: short the higher put
        }
        if low.is_short() && high.is_long() {
            return Some(BEAR_PUT_SPREAD); // debit: long the higher put
        }
    } else {
        if low.is_long() && high.is_short() {
            return Some(BULL_CALL_SPREAD); // debit: long the lower call
        }
        if low.is_short() && high.is_long() {
            return Some(BEAR_CALL_SPREAD); // credit: short the lower call
        }
    }

    None
}
