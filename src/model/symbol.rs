use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "Call",
            OptionType::Put => "Put",
        }
    }
}

impl std::str::FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Call" => Ok(OptionType::Call),
            "Put" => Ok(OptionType::Put),
            other => Err(format!("unknown option type `{other}`")),
        }
    }
}

/// Contract terms parsed out of an OCC option symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptionDetails {
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

/// Parse an OCC-style option symbol: `"UNDERLYING  YYMMDD[C|P]NNNNNNNN"`.
///
/// The strike digits encode thousandths of a dollar (`00170000` → 170).
/// Returns `None` for equity symbols or anything that does not decode; the
/// caller leaves option fields null in that case.
pub fn parse_occ(symbol: &str) -> Option<OptionDetails> {
    let mut parts = symbol.split_whitespace();
    let _underlying = parts.next()?;
    let contract = parts.next()?;
    if contract.len() < 8 || !contract.is_ascii() {
        return None;
    }

    let expiration = NaiveDate::parse_from_str(&format!("20{}", &contract[..6]), "%Y%m%d").ok()?;

    let option_type = match &contract[6..7] {
        "C" => OptionType::Call,
        "P" => OptionType::Put,
        _ => return None,
    };

    let strike_raw: i64 = contract[7..].parse().ok()?;
    let strike = Decimal::new(strike_raw, 3).normalize();

    Some(OptionDetails {
        option_type,
        strike,
        expiration,
    })
}

/// The ticker portion of a symbol (everything before the first space).
pub fn underlying_of(symbol: &str) -> &str {
    symbol.split_whitespace().next().unwrap_or(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_call_symbol() {
        let details = parse_occ("AAPL  250321C00170000").unwrap();
        assert_eq!(details.option_type, OptionType::Call);
        assert_eq!(details.strike, dec!(170));
        assert_eq!(
            details.expiration,
            NaiveDate::from_ymd_opt(2025, 3, 21).unwrap()
        );
    }

    #[test]
    fn parses_fractional_strike() {
        let details = parse_occ("XYZ 250620P00012500").unwrap();
        assert_eq!(details.option_type, OptionType::Put);
        assert_eq!(details.strike, dec!(12.5));
    }

    #[test]
    fn rejects_equity_symbol() {
        assert!(parse_occ("AAPL").is_none());
    }

    #[test]
    fn rejects_garbage_contract() {
        assert!(parse_occ("AAPL  25032XC00170000").is_none());
        assert!(parse_occ("AAPL  250321X00170000").is_none());
        assert!(parse_occ("AAPL  250321C00abc00").is_none());
    }
}
