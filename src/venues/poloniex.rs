//! poloniex venue adapter.
//!
//! Native symbols put the quote currency first (`usdt_btc`, `btc_dsh`)
//! and use the venue's own spellings: the book settles in the USDT
//! stablecoin but quotes as USD for our purposes, and DASH is abbreviated
//! `dsh`. Both aliases are absorbed by the pair mapping so canonical
//! pairs stay venue-independent. Signed calls are HMAC-SHA512 hex over
//! the form body with a millisecond nonce.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, hmac_sha512_hex, HttpTransport};
use crate::venue::nonce::millisecond_nonce;
use crate::venue::retry::{with_nonce_retry, NONCE_RETRY_ATTEMPTS};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, BalanceKind, BalanceReport, OpenOrder, OrderBook, Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Poloniex;
const PUBLIC_URL: &str = "https://poloniex.com/public";
const TRADE_URL: &str = "https://poloniex.com/tradingApi";

const NONCE_REJECTED: &str = "Nonce must be greater";

/// Quote-first lowercase symbols with venue spellings (`usdt` for USD,
/// `dsh` for DASH).
pub struct PoloniexPairs;

fn alias_to_poloniex(currency: Currency) -> &'static str {
    match currency {
        Currency::Usd => "usdt",
        Currency::Dash => "dsh",
        Currency::Btc => "btc",
        Currency::Ltc => "ltc",
        Currency::Eth => "eth",
        Currency::Doge => "doge",
        other => {
            // remaining fiat codes have no book on this venue; to_venue
            // rejects them before getting here
            other.code()
        }
    }
}

impl PairFormatter for PoloniexPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        // only USDT books and crypto cross-pairs exist
        if pair.quote().is_fiat() && pair.quote() != Currency::Usd {
            return Err(self.unsupported_pair(pair));
        }
        if pair.base().is_fiat() {
            return Err(self.unsupported_pair(pair));
        }
        Ok(format!(
            "{}_{}",
            alias_to_poloniex(pair.quote()),
            alias_to_poloniex(pair.base())
        ))
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let symbol = native.trim().to_uppercase();
        let (quote, base) = symbol
            .split_once('_')
            .ok_or_else(|| self.bad_native_symbol(native))?;
        let quote = Currency::from_code(quote).ok_or_else(|| self.bad_native_symbol(native))?;
        let base = Currency::from_code(base).ok_or_else(|| self.bad_native_symbol(native))?;
        if base.is_fiat() || (quote.is_fiat() && quote != Currency::Usd) {
            return Err(self.bad_native_symbol(native));
        }
        CanonicalPair::new(base, quote).map_err(|e| VenueError::new(VENUE, e))
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

fn fail_on_error(value: Value) -> VenueResult<Value> {
    if let Some(error) = value.get("error") {
        return Err(VenueError::new(VENUE, as_text(error)));
    }
    Ok(value)
}

fn ticker_from(tick: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
    let field = |key: &str| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    // the venue's "quoteVolume" counts the second listed currency, which
    // is the canonical base
    Ok(Ticker::from_parts(
        field("highestBid")?,
        field("lowestAsk")?,
        field("high24hr")?,
        field("low24hr")?,
        field("last")?,
        field("quoteVolume")?,
        pair.quote(),
        pair.base(),
        Utc::now(),
    ))
}

fn balances_from(raw: &Value) -> VenueResult<(MultiMoney, MultiMoney)> {
    let Some(entries) = raw.as_object() else {
        return Err(malformed("expected balance map", raw));
    };
    let mut available = MultiMoney::new();
    let mut on_orders = MultiMoney::new();
    for (code, entry) in entries {
        let Some(currency) = Currency::from_code(code) else {
            continue;
        };
        if let Some(amount) = entry.get("available").and_then(as_decimal) {
            available += Money::new(amount, currency);
        }
        if let Some(amount) = entry.get("onOrders").and_then(as_decimal) {
            on_orders += Money::new(amount, currency);
        }
    }
    Ok((available, on_orders))
}

fn open_orders_from(raw: &Value, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
    let Some(list) = raw.as_array() else {
        return Err(malformed("expected order list", raw));
    };
    let mut orders = Vec::new();
    for order in list {
        let side = order
            .get("type")
            .and_then(Value::as_str)
            .and_then(Side::from_buy_sell)
            .ok_or_else(|| malformed("order without side", order))?;
        let rate = order
            .get("rate")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without rate", order))?;
        let amount = order
            .get("amount")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without amount", order))?;
        let order_id = order
            .get("orderNumber")
            .map(as_text)
            .ok_or_else(|| malformed("order without number", order))?;
        orders.push(OpenOrder {
            price: Money::new(rate, pair.quote()),
            amount: Money::new(amount, pair.base()),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

/// poloniex client.
pub struct Poloniex {
    http: HttpTransport,
    key: String,
    secret: String,
    pairs: PoloniexPairs,
    block_orders: bool,
}

impl Poloniex {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> Poloniex {
        Poloniex {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            pairs: PoloniexPairs,
            block_orders,
        }
    }

    /// The venue spells currency pairs uppercase in requests and response
    /// keys.
    fn wire_pair(&self, pair: &CanonicalPair) -> VenueResult<String> {
        Ok(self.pairs.to_venue(pair)?.to_uppercase())
    }

    async fn public(&self, command: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let mut query: Vec<(&str, String)> = vec![("command", command.to_string())];
        query.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let value = self.http.get(VENUE, PUBLIC_URL, &query).await?;
        fail_on_error(value)
    }

    async fn private(&self, command: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        with_nonce_retry(
            NONCE_RETRY_ATTEMPTS,
            |e| e.message.contains(NONCE_REJECTED),
            || self.private_once(command, params),
        )
        .await
    }

    async fn private_once(&self, command: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let nonce = millisecond_nonce();
        let mut form: Vec<(&str, String)> = vec![
            ("command", command.to_string()),
            ("nonce", nonce.to_string()),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let body = build_query_string(&form);

        let signature = hmac_sha512_hex(self.secret.as_bytes(), body.as_bytes());
        let headers = [("Key", self.key.clone()), ("Sign", signature)];

        let value = self.http.post_form(VENUE, TRADE_URL, body, &headers).await?;
        fail_on_error(value)
    }
}

#[async_trait]
impl Exchange for Poloniex {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let wire = self.wire_pair(pair)?;
        let response = self.public("returnTicker", &[]).await?;
        let tick = response
            .get(&wire)
            .ok_or_else(|| malformed("ticker missing pair", &response))?;
        ticker_from(tick, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let wire = self.wire_pair(pair)?;
        let book = self
            .public("returnOrderBook", &[("currencyPair", wire)])
            .await?;
        Ok(OrderBook {
            bids: book
                .get("bids")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            asks: book
                .get("asks")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn get_balance(&self, kind: BalanceKind) -> VenueResult<BalanceReport> {
        let raw = self.private("returnCompleteBalances", &[]).await?;
        let (available, on_orders) = balances_from(&raw)?;
        let total = available.clone() + on_orders;
        Ok(match kind {
            BalanceKind::Total => BalanceReport::Total(total),
            BalanceKind::Available => BalanceReport::Available(available),
            BalanceKind::Both => BalanceReport::Both { total, available },
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let wire = self.wire_pair(pair)?;
        let raw = self
            .private("returnOpenOrders", &[("currencyPair", wire)])
            .await?;
        open_orders_from(&raw, pair)
    }

    async fn create_order(
        &self,
        amount: Decimal,
        price: Decimal,
        side: Side,
        pair: &CanonicalPair,
    ) -> VenueResult<String> {
        if self.block_orders {
            return Ok(ORDER_BLOCKED.to_string());
        }
        let wire = self.wire_pair(pair)?;
        let command = match side {
            Side::Bid => "buy",
            Side::Ask => "sell",
        };
        let params = [
            ("currencyPair", wire),
            ("rate", price.to_string()),
            ("amount", amount.to_string()),
        ];
        let order = self.private(command, &params).await?;
        match order.get("orderNumber") {
            Some(number) if !number.is_null() => Ok(as_text(number)),
            _ => Err(malformed("order accepted without number", &order)),
        }
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let params = [("orderNumber", order_id.to_string())];
        match self.private("cancelOrder", &params).await {
            Ok(response) => {
                Ok(response.get("success").and_then(Value::as_i64) == Some(1))
            }
            // already-gone reads as success, per the contract
            Err(err) if err.message == "Order could not be cancelled." => Ok(true),
            Err(err) => Err(err),
        }
    }

    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String> {
        let addresses = self.private("returnDepositAddresses", &[]).await?;
        // response keys use the venue's own spellings
        let code = alias_to_poloniex(currency).to_uppercase();
        addresses
            .get(&code)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                VenueError::new(VENUE, format!("no deposit address for {}", currency))
            })
    }

    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value> {
        let wire = self.wire_pair(pair)?;
        self.private("returnTradeHistory", &[("currencyPair", wire)])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn pair(s: &str) -> CanonicalPair {
        s.parse().unwrap()
    }

    #[test]
    fn test_reversed_quote_first_mapping() {
        let pairs = PoloniexPairs;
        // the stablecoin book quotes as USD
        assert_eq!(pairs.to_venue(&pair("BTC_USD")).unwrap(), "usdt_btc");
        // DASH is abbreviated and the quote comes first
        assert_eq!(pairs.to_venue(&pair("DASH_BTC")).unwrap(), "btc_dsh");
    }

    #[test]
    fn test_dash_btc_scenario() {
        let pairs = PoloniexPairs;
        let p = pairs.to_canonical("btc_dsh").unwrap();
        assert_eq!(p.base(), Currency::Dash);
        assert_eq!(p.quote(), Currency::Btc);
        assert_eq!(p.to_string(), "DASH_BTC");
        assert_eq!(pairs.to_venue(&p).unwrap(), "btc_dsh");
    }

    #[test]
    fn test_pair_round_trip() {
        let pairs = PoloniexPairs;
        for canonical in ["BTC_USD", "DASH_BTC", "ETH_BTC", "DOGE_BTC", "DASH_USD"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
            assert_eq!(
                pairs.to_venue(&pairs.to_canonical(&native).unwrap()).unwrap(),
                native
            );
        }
    }

    #[test]
    fn test_fiat_books_other_than_usd_rejected() {
        let pairs = PoloniexPairs;
        assert!(pairs.to_venue(&pair("BTC_EUR")).is_err());
        assert!(pairs.to_canonical("eur_btc").is_err());
    }

    #[test]
    fn test_ticker_volume_uses_base_side() {
        let tick = json!({
            "last": "244.5", "lowestAsk": "244.9", "highestBid": "244.1",
            "high24hr": "249.0", "low24hr": "240.0",
            "baseVolume": "921000.0", "quoteVolume": "3750.2"
        });
        let ticker = ticker_from(&tick, &pair("BTC_USD")).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(244.1));
        assert_eq!(ticker.ask.amount(), dec!(244.9));
        // volume counts BTC, the canonical base
        assert_eq!(ticker.volume, Money::new(dec!(3750.2), Currency::Btc));
        assert_eq!(ticker.bid.currency(), Currency::Usd);
    }

    #[test]
    fn test_balances_fold_usdt_into_usd() {
        let raw = json!({
            "BTC": {"available": "1.0", "onOrders": "0.5", "btcValue": "1.5"},
            "USDT": {"available": "300.0", "onOrders": "100.0", "btcValue": "1.6"},
            "XMR": {"available": "10.0", "onOrders": "0", "btcValue": "0.1"}
        });
        let (available, on_orders) = balances_from(&raw).unwrap();
        let total = available.clone() + on_orders;

        assert_eq!(total.get(Currency::Btc).amount(), dec!(1.5));
        // USDT reports as USD
        assert_eq!(total.get(Currency::Usd).amount(), dec!(400.0));
        assert_eq!(available.get(Currency::Usd).amount(), dec!(300.0));
        // unknown currencies are skipped
        assert_eq!(total.len(), 2);
    }

    #[test]
    fn test_open_orders_parsing() {
        let raw = json!([
            {"orderNumber": "120466", "type": "sell", "rate": "0.025", "amount": "100", "total": "2.5"},
            {"orderNumber": "120467", "type": "buy", "rate": "0.022", "amount": "10", "total": "0.22"}
        ]);
        let orders = open_orders_from(&raw, &pair("DASH_BTC")).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].side, Side::Ask);
        assert_eq!(orders[0].price, Money::new(dec!(0.025), Currency::Btc));
        assert_eq!(orders[0].amount, Money::new(dec!(100), Currency::Dash));
        assert_eq!(orders[1].order_id, "120467");
    }

    #[test]
    fn test_error_field_is_verbatim() {
        let err = fail_on_error(json!({"error": "Invalid currency pair."})).unwrap_err();
        assert_eq!(err.message, "Invalid currency pair.");
    }
}
