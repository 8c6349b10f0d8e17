//! Same-expiration multi-leg patterns: iron condor/butterfly, straddles,
//! strangles.

use std::collections::HashSet;

use chrono::NaiveDate;

use super::registry::{
    IRON_BUTTERFLY, IRON_CONDOR, LONG_STRADDLE, LONG_STRANGLE, SHORT_STRADDLE, SHORT_STRANGLE,
};
use super::types::Leg;

pub fn match_multi(legs: &[Leg]) -> Option<&'static str> {
    if legs.is_empty() || legs.iter().any(|l| !l.is_option()) {
        return None;
    }
    let expirations: HashSet<Option<NaiveDate>> = legs.iter().map(|l| l.expiration).collect();
    if expirations.len() != 1 {
        return None;
    }

    match legs.len() {
        4 => match_four_leg(legs),
        2 => match_two_leg(legs),
        _ => None,
    }
}

/// Long wings, short body; equal body strikes make it a butterfly.
fn match_four_leg(legs: &[Leg]) -> Option<&'static str> {
    let mut puts: Vec<&Leg> = legs.iter().filter(|l| l.is_put()).collect();
    let mut calls: Vec<&Leg> = legs.iter().filter(|l| l.is_call()).collect();

    if puts.len() != 2 || calls.len() != 2 {
        return None;
    }

    puts.sort_by_key(|l| l.strike);
    calls.sort_by_key(|l| l.strike);

    let (long_put, short_put) = (puts[0], puts[1]);
    let (short_call, long_call) = (calls[0], calls[1]);

    if !(long_put.is_long() && short_put.is_short() && short_call.is_short() && long_call.is_long())
    {
        return None;
    }

    // Strike ordering: long put < short put <= short call < long call.
    if !(long_put.strike < short_put.strike
        && short_put.strike <= short_call.strike
        && short_call.strike < long_call.strike)
    {
        return None;
    }

    if short_put.strike == short_call.strike {
        Some(IRON_BUTTERFLY)
    } else {
        Some(IRON_CONDOR)
    }
}

/// One put + one call, same direction: straddle at one strike, strangle at
/// two. Same-type pairs are verticals and handled elsewhere.
fn match_two_leg(legs: &[Leg]) -> Option<&'static str> {
    let (a, b) = (&legs[0], &legs[1]);

    if a.option_type == b.option_type || a.direction != b.direction {
        return None;
    }

    let is_short = a.is_short();
    if a.strike == b.strike {
        Some(if is_short { SHORT_STRADDLE } else { LONG_STRADDLE })
    } else {
        Some(if is_short { SHORT_STRANGLE } else { LONG_STRANGLE })
    }
}
