//! Shared value types for the venue contract.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::money::{Currency, Money, MultiMoney};

/// Identifier for one supported venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    Kraken,
    Bitstamp,
    Bitfinex,
    Btce,
    Exmo,
    Huobi,
    Okcoin,
    Lakebtc,
    Poloniex,
}

impl VenueId {
    pub const ALL: [VenueId; 9] = [
        VenueId::Kraken,
        VenueId::Bitstamp,
        VenueId::Bitfinex,
        VenueId::Btce,
        VenueId::Exmo,
        VenueId::Huobi,
        VenueId::Okcoin,
        VenueId::Lakebtc,
        VenueId::Poloniex,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            VenueId::Kraken => "kraken",
            VenueId::Bitstamp => "bitstamp",
            VenueId::Bitfinex => "bitfinex",
            VenueId::Btce => "btce",
            VenueId::Exmo => "exmo",
            VenueId::Huobi => "huobi",
            VenueId::Okcoin => "okcoin",
            VenueId::Lakebtc => "lakebtc",
            VenueId::Poloniex => "poloniex",
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VenueId::ALL
            .into_iter()
            .find(|venue| venue.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| format!("unknown venue: {}", s))
    }
}

/// Order side, normalized at the venue boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }

    /// Translate a venue's `buy`/`sell` vocabulary.
    pub fn from_buy_sell(word: &str) -> Option<Side> {
        match word.trim().to_lowercase().as_str() {
            "buy" => Some(Side::Bid),
            "sell" => Some(Side::Ask),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A venue's current top-of-market snapshot.
///
/// `bid`, `ask`, `high`, `low` and `last` share the pair's quote currency;
/// `volume` is denominated in the base currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticker {
    pub bid: Money,
    pub ask: Money,
    pub high: Money,
    pub low: Money,
    pub last: Money,
    pub volume: Money,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Assemble a ticker from decimal fields, tagging prices with the quote
    /// currency and volume with the base currency so the currency invariant
    /// holds by construction.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        bid: Decimal,
        ask: Decimal,
        high: Decimal,
        low: Decimal,
        last: Decimal,
        volume: Decimal,
        quote: Currency,
        base: Currency,
        timestamp: DateTime<Utc>,
    ) -> Ticker {
        Ticker {
            bid: Money::new(bid, quote),
            ask: Money::new(ask, quote),
            high: Money::new(high, quote),
            low: Money::new(low, quote),
            last: Money::new(last, quote),
            volume: Money::new(volume, base),
            timestamp,
        }
    }

    /// Sanity check that the venue's timestamp is a recent wall-clock value.
    pub fn is_recent(&self, max_age: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.timestamp);
        age >= chrono::Duration::zero()
            && age <= chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX)
    }
}

/// A single resting order in a book: price and size, currency implied by
/// the book's pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderbookItem {
    pub price: Decimal,
    pub amount: Decimal,
}

/// An order book as the venue returned it.
///
/// Entries stay in the venue's native shape and ordering; normalize them
/// per item through the adapter's `format_book_item`.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<Value>,
    pub asks: Vec<Value>,
}

/// One of the caller's own open orders, as reported by a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder {
    /// Limit price, in the quote currency.
    pub price: Money,
    /// Remaining size, in the base currency.
    pub amount: Money,
    pub side: Side,
    pub venue: VenueId,
    pub order_id: String,
}

impl OpenOrder {
    /// Funds this order ties up while resting: quote notional for a bid,
    /// base amount for an ask.
    pub fn tied_up(&self) -> Money {
        match self.side {
            Side::Bid => self.price * self.amount.amount(),
            Side::Ask => self.amount,
        }
    }
}

/// Which balance figures the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceKind {
    /// Funds on the books, including amounts tied up in open orders.
    Total,
    /// Funds free to trade.
    Available,
    /// Both figures in one call.
    Both,
}

/// Balance figures returned for a [`BalanceKind`] request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BalanceReport {
    Total(MultiMoney),
    Available(MultiMoney),
    Both {
        total: MultiMoney,
        available: MultiMoney,
    },
}

impl BalanceReport {
    pub fn total(&self) -> Option<&MultiMoney> {
        match self {
            BalanceReport::Total(total) | BalanceReport::Both { total, .. } => Some(total),
            BalanceReport::Available(_) => None,
        }
    }

    pub fn available(&self) -> Option<&MultiMoney> {
        match self {
            BalanceReport::Available(available)
            | BalanceReport::Both { available, .. } => Some(available),
            BalanceReport::Total(_) => None,
        }
    }

    pub fn into_both(self) -> Option<(MultiMoney, MultiMoney)> {
        match self {
            BalanceReport::Both { total, available } => Some((total, available)),
            _ => None,
        }
    }
}

/// Parse a decimal out of a JSON value that may be a string or a number.
/// Venues are split roughly evenly on which they send.
pub fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

/// A venue's error field as text: strings verbatim, anything else as
/// compact JSON. Callers pattern-match on this, so no rewording happens
/// here.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse an epoch-seconds timestamp that may arrive as a string, an
/// integer, or a float.
pub fn timestamp_from_epoch(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = match value {
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    let millis = (seconds * 1000.0) as i64;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_venue_id_round_trip() {
        for venue in VenueId::ALL {
            assert_eq!(venue.as_str().parse::<VenueId>().unwrap(), venue);
        }
        assert!("mtgox".parse::<VenueId>().is_err());
    }

    #[test]
    fn test_side_vocabulary() {
        assert_eq!(Side::from_buy_sell("buy"), Some(Side::Bid));
        assert_eq!(Side::from_buy_sell("SELL"), Some(Side::Ask));
        assert_eq!(Side::from_buy_sell("hodl"), None);
    }

    #[test]
    fn test_ticker_currency_invariant() {
        let ticker = Ticker::from_parts(
            dec!(100),
            dec!(101),
            dec!(110),
            dec!(90),
            dec!(100.5),
            dec!(12.25),
            Currency::Usd,
            Currency::Btc,
            Utc::now(),
        );
        assert_eq!(ticker.bid.currency(), Currency::Usd);
        assert_eq!(ticker.last.currency(), Currency::Usd);
        assert_eq!(ticker.volume.currency(), Currency::Btc);
        assert!(ticker.is_recent(Duration::from_secs(60)));
    }

    #[test]
    fn test_tied_up_is_side_dependent() {
        let bid = OpenOrder {
            price: Money::new(dec!(200), Currency::Usd),
            amount: Money::new(dec!(0.5), Currency::Btc),
            side: Side::Bid,
            venue: VenueId::Btce,
            order_id: "1".to_string(),
        };
        assert_eq!(bid.tied_up(), Money::new(dec!(100), Currency::Usd));

        let ask = OpenOrder { side: Side::Ask, ..bid };
        assert_eq!(ask.tied_up(), Money::new(dec!(0.5), Currency::Btc));
    }

    #[test]
    fn test_as_decimal_accepts_strings_and_numbers() {
        assert_eq!(as_decimal(&json!("203.50")), Some(dec!(203.50)));
        assert_eq!(as_decimal(&json!(203.5)), Some(dec!(203.5)));
        assert_eq!(as_decimal(&json!(42)), Some(dec!(42)));
        assert_eq!(as_decimal(&json!(null)), None);
        assert_eq!(as_decimal(&json!("not a number")), None);
    }

    #[test]
    fn test_timestamp_from_epoch_variants() {
        let expected = Utc.timestamp_opt(1_414_170_000, 0).unwrap();
        assert_eq!(timestamp_from_epoch(&json!(1_414_170_000)), Some(expected));
        assert_eq!(timestamp_from_epoch(&json!("1414170000")), Some(expected));
        assert_eq!(
            timestamp_from_epoch(&json!(1_414_170_000.0)),
            Some(expected)
        );
        assert_eq!(timestamp_from_epoch(&json!([])), None);
    }
}
