//! Cross-expiration 2-leg patterns: calendar, diagonal, PMCC.

use super::registry::{CALENDAR_SPREAD, DIAGONAL_SPREAD, PMCC};
use super::types::Leg;

/// Two option legs, same type, different expirations.
pub fn match_calendar(legs: &[Leg]) -> Option<&'static str> {
    let [a, b] = legs else {
        return None;
    };
    if !a.is_option() || !b.is_option() {
        return None;
    }
    if a.option_type != b.option_type || a.expiration == b.expiration {
        return None;
    }

    let (near, far) = if a.expiration < b.expiration { (a, b) } else { (b, a) };

    if near.strike == far.strike {
        return Some(CALENDAR_SPREAD);
    }

    // PMCC: long far-dated call below a short near-term call.
    if a.is_call() && far.is_long() && near.is_short() && far.strike < near.strike {
        return Some(PMCC);
    }

    Some(DIAGONAL_SPREAD)
}
