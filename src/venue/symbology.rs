//! Pair normalization between canonical and venue-native symbols.
//!
//! The canonical form is `BASE_QUOTE` with uppercase codes, e.g.
//! `BTC_USD`, `DASH_BTC`. Each venue supplies a [`PairFormatter`] that maps
//! canonical pairs onto whatever the venue speaks natively and back:
//! plain concatenation (`btcusd`), underscores (`btc_usd`), prefix
//! schemes (`XXBTZUSD`), or reversed quote-first spellings (`btc_dsh`).
//!
//! The round-trip invariant is the contract: for every pair a venue
//! supports, `to_canonical(to_venue(p)) == p` and
//! `to_venue(to_canonical(s)) == s`.

use std::fmt;
use std::str::FromStr;

use crate::money::Currency;

use super::error::{VenueError, VenueResult};
use super::types::VenueId;

/// A venue-independent currency pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    base: Currency,
    quote: Currency,
}

impl CanonicalPair {
    /// Build a pair. Base and quote must differ.
    pub fn new(base: Currency, quote: Currency) -> Result<CanonicalPair, String> {
        if base == quote {
            return Err(format!("degenerate pair {}_{}", base, quote));
        }
        Ok(CanonicalPair { base, quote })
    }

    pub fn base(&self) -> Currency {
        self.base
    }

    pub fn quote(&self) -> Currency {
        self.quote
    }
}

impl fmt::Display for CanonicalPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

impl FromStr for CanonicalPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .trim()
            .split_once('_')
            .ok_or_else(|| format!("pair must be BASE_QUOTE: {}", s))?;
        let base = Currency::from_code(base).ok_or_else(|| format!("unknown base in {}", s))?;
        let quote = Currency::from_code(quote).ok_or_else(|| format!("unknown quote in {}", s))?;
        CanonicalPair::new(base, quote)
    }
}

/// Bidirectional translation between canonical pairs and one venue's
/// native symbols.
pub trait PairFormatter: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Canonical pair to the venue's native spelling. Errors on pairs the
    /// venue does not support.
    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String>;

    /// Venue-native spelling back to the canonical pair.
    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair>;

    fn unsupported_pair(&self, pair: &CanonicalPair) -> VenueError {
        VenueError::new(self.venue(), format!("unsupported pair {}", pair))
    }

    fn bad_native_symbol(&self, native: &str) -> VenueError {
        VenueError::new(
            self.venue(),
            format!("unrecognized native symbol {:?}", native),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let pair: CanonicalPair = "DASH_BTC".parse().unwrap();
        assert_eq!(pair.base(), Currency::Dash);
        assert_eq!(pair.quote(), Currency::Btc);
        assert_eq!(pair.to_string(), "DASH_BTC");
    }

    #[test]
    fn test_parse_accepts_aliases() {
        let pair: CanonicalPair = "XBT_USDT".parse().unwrap();
        assert_eq!(pair.base(), Currency::Btc);
        assert_eq!(pair.quote(), Currency::Usd);
        assert_eq!(pair.to_string(), "BTC_USD");
    }

    #[test]
    fn test_degenerate_pair_rejected() {
        assert!("BTC_BTC".parse::<CanonicalPair>().is_err());
        // USDT aliases to USD, so this is degenerate too
        assert!("USDT_USD".parse::<CanonicalPair>().is_err());
    }

    #[test]
    fn test_malformed_pair_rejected() {
        assert!("BTCUSD".parse::<CanonicalPair>().is_err());
        assert!("BTC_XYZ".parse::<CanonicalPair>().is_err());
    }
}
