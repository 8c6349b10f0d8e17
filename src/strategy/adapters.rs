//! Bridge from lots to the recognizer's [`Leg`] type.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::model::{InstrumentType, Lot, LotStatus, OptionType};

use super::types::{Direction, Leg, LegInstrument};

/// Convert lots to aggregated legs.
///
/// Open lots are grouped by structural identity and summed over absolute
/// remaining quantity. When nothing is open (a fully closed position being
/// labelled after the fact), legs are rebuilt from every lot as opened, so
/// a closed iron condor is still recognizable as one.
pub fn lots_to_legs(lots: &[Lot]) -> Vec<Leg> {
    let open = aggregate(
        lots.iter()
            .filter(|l| l.status != LotStatus::Closed && l.remaining_quantity != Decimal::ZERO),
        |l| l.remaining_quantity.abs(),
    );
    if !open.is_empty() {
        return open;
    }
    aggregate(lots.iter(), |l| l.original_quantity)
}

type LegKey = (
    LegInstrument,
    Option<OptionType>,
    Option<Decimal>,
    Option<NaiveDate>,
    Direction,
);

fn aggregate<'a, I, F>(lots: I, quantity_of: F) -> Vec<Leg>
where
    I: Iterator<Item = &'a Lot>,
    F: Fn(&Lot) -> Decimal,
{
    let mut index: HashMap<LegKey, usize> = HashMap::new();
    let mut legs: Vec<Leg> = Vec::new();

    for lot in lots {
        let quantity = quantity_of(lot);
        if quantity == Decimal::ZERO {
            continue;
        }

        let instrument = match lot.instrument_type {
            InstrumentType::Equity => LegInstrument::Equity,
            InstrumentType::EquityOption => LegInstrument::Option,
        };
        let direction = if lot.is_short() {
            Direction::Short
        } else {
            Direction::Long
        };

        let key = (instrument, lot.option_type, lot.strike, lot.expiration, direction);
        match index.get(&key) {
            Some(&i) => legs[i].quantity += quantity,
            None => {
                index.insert(key, legs.len());
                legs.push(Leg {
                    instrument,
                    option_type: lot.option_type,
                    strike: lot.strike,
                    expiration: lot.expiration,
                    direction,
                    quantity,
                });
            }
        }
    }
    legs
}
