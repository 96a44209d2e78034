//! Currency codes known to the library.
//!
//! Canonical data only ever carries codes from this set. Venue-specific
//! spellings (`XBT`, `DSH`, `XDG`) and stablecoin stand-ins (`USDT`) are
//! absorbed by [`Currency::from_code`] so they never leak past the venue
//! boundary.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A currency this library knows how to account for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Currency {
    Btc,
    Ltc,
    Eth,
    Dash,
    Doge,
    Usd,
    Eur,
    Gbp,
    Cny,
    Rub,
}

/// Error returned when a currency code is not in the known set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown currency code: {0}")]
pub struct UnknownCurrency(pub String);

impl Currency {
    /// The canonical uppercase code.
    pub const fn code(&self) -> &'static str {
        match self {
            Currency::Btc => "BTC",
            Currency::Ltc => "LTC",
            Currency::Eth => "ETH",
            Currency::Dash => "DASH",
            Currency::Doge => "DOGE",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Cny => "CNY",
            Currency::Rub => "RUB",
        }
    }

    /// Parse a venue-reported code, accepting known aliases.
    ///
    /// `USDT` maps to [`Currency::Usd`]: venues that settle in the
    /// stablecoin still quote as USD for our purposes.
    pub fn from_code(code: &str) -> Option<Currency> {
        let code = code.trim().to_uppercase();
        let currency = match code.as_str() {
            "BTC" | "XBT" => Currency::Btc,
            "LTC" => Currency::Ltc,
            "ETH" => Currency::Eth,
            "DASH" | "DSH" => Currency::Dash,
            "DOGE" | "XDG" => Currency::Doge,
            "USD" | "USDT" => Currency::Usd,
            "EUR" => Currency::Eur,
            "GBP" => Currency::Gbp,
            "CNY" => Currency::Cny,
            "RUB" => Currency::Rub,
            _ => return None,
        };
        Some(currency)
    }

    /// True for government-issued currencies.
    pub const fn is_fiat(&self) -> bool {
        matches!(
            self,
            Currency::Usd | Currency::Eur | Currency::Gbp | Currency::Cny | Currency::Rub
        )
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = UnknownCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_code(s).ok_or_else(|| UnknownCurrency(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for currency in [
            Currency::Btc,
            Currency::Dash,
            Currency::Usd,
            Currency::Cny,
        ] {
            assert_eq!(Currency::from_code(currency.code()), Some(currency));
        }
    }

    #[test]
    fn test_aliases() {
        assert_eq!(Currency::from_code("XBT"), Some(Currency::Btc));
        assert_eq!(Currency::from_code("DSH"), Some(Currency::Dash));
        assert_eq!(Currency::from_code("XDG"), Some(Currency::Doge));
        assert_eq!(Currency::from_code("USDT"), Some(Currency::Usd));
        assert_eq!(Currency::from_code("usdt"), Some(Currency::Usd));
    }

    #[test]
    fn test_unknown_code() {
        assert_eq!(Currency::from_code("XYZ"), None);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    #[test]
    fn test_fiat() {
        assert!(Currency::Usd.is_fiat());
        assert!(Currency::Cny.is_fiat());
        assert!(!Currency::Btc.is_fiat());
        assert!(!Currency::Dash.is_fiat());
    }
}
