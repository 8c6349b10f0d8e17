//! The strategy registry: single source of truth for strategy metadata.

use super::types::{Bias, CreditDebit, StrategyDef};

pub const BULL_PUT_SPREAD: &str = "Bull Put Spread";
pub const BEAR_CALL_SPREAD: &str = "Bear Call Spread";
pub const BULL_CALL_SPREAD: &str = "Bull Call Spread";
pub const BEAR_PUT_SPREAD: &str = "Bear Put Spread";
pub const IRON_CONDOR: &str = "Iron Condor";
pub const IRON_BUTTERFLY: &str = "Iron Butterfly";
pub const SHORT_STRANGLE: &str = "Short Strangle";
pub const SHORT_STRADDLE: &str = "Short Straddle";
pub const LONG_STRANGLE: &str = "Long Strangle";
pub const LONG_STRADDLE: &str = "Long Straddle";
pub const CASH_SECURED_PUT: &str = "Cash Secured Put";
pub const SHORT_PUT: &str = "Short Put";
pub const SHORT_CALL: &str = "Short Call";
pub const LONG_CALL: &str = "Long Call";
pub const LONG_PUT: &str = "Long Put";
pub const COVERED_CALL: &str = "Covered Call";
pub const COLLAR: &str = "Collar";
pub const JADE_LIZARD: &str = "Jade Lizard";
pub const CALENDAR_SPREAD: &str = "Calendar Spread";
pub const DIAGONAL_SPREAD: &str = "Diagonal Spread";
pub const PMCC: &str = "PMCC";
pub const SHARES: &str = "Shares";

pub static STRATEGIES: &[StrategyDef] = &[
    // Credit strategies
    StrategyDef { name: BULL_PUT_SPREAD, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Credit), leg_count: 2 },
    StrategyDef { name: BEAR_CALL_SPREAD, direction: Some(Bias::Bearish), credit_debit: Some(CreditDebit::Credit), leg_count: 2 },
    StrategyDef { name: IRON_CONDOR, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Credit), leg_count: 4 },
    StrategyDef { name: IRON_BUTTERFLY, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Credit), leg_count: 4 },
    StrategyDef { name: SHORT_STRANGLE, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Credit), leg_count: 2 },
    StrategyDef { name: SHORT_STRADDLE, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Credit), leg_count: 2 },
    StrategyDef { name: CASH_SECURED_PUT, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Credit), leg_count: 1 },
    StrategyDef { name: SHORT_PUT, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Credit), leg_count: 1 },
    StrategyDef { name: SHORT_CALL, direction: Some(Bias::Bearish), credit_debit: Some(CreditDebit::Credit), leg_count: 1 },
    StrategyDef { name: COVERED_CALL, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Credit), leg_count: 2 },
    StrategyDef { name: JADE_LIZARD, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Credit), leg_count: 3 },
    // Debit strategies
    StrategyDef { name: BULL_CALL_SPREAD, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: BEAR_PUT_SPREAD, direction: Some(Bias::Bearish), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: LONG_CALL, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Debit), leg_count: 1 },
    StrategyDef { name: LONG_PUT, direction: Some(Bias::Bearish), credit_debit: Some(CreditDebit::Debit), leg_count: 1 },
    StrategyDef { name: LONG_STRANGLE, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: LONG_STRADDLE, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: CALENDAR_SPREAD, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: DIAGONAL_SPREAD, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    StrategyDef { name: PMCC, direction: Some(Bias::Bullish), credit_debit: Some(CreditDebit::Debit), leg_count: 2 },
    // Mixed / equity
    StrategyDef { name: COLLAR, direction: Some(Bias::Neutral), credit_debit: Some(CreditDebit::Mixed), leg_count: 3 },
    StrategyDef { name: SHARES, direction: None, credit_debit: None, leg_count: 1 },
];

pub fn lookup(name: &str) -> Option<&'static StrategyDef> {
    STRATEGIES.iter().find(|s| s.name == name)
}
