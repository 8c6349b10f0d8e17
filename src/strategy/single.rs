//! Singleton patterns.

use super::registry::{LONG_CALL, LONG_PUT, SHARES, SHORT_CALL, SHORT_PUT};
use super::types::{Leg, LegInstrument};

pub fn match_single(leg: &Leg) -> Option<&'static str> {
    match leg.instrument {
        LegInstrument::Equity => Some(SHARES),
        LegInstrument::Option => {
            if leg.is_call() {
                Some(if leg.is_long() { LONG_CALL } else { SHORT_CALL })
            } else if leg.is_put() {
                Some(if leg.is_long() { LONG_PUT } else { SHORT_PUT })
            } else {
                None
            }
        }
    }
}
