//! btce venue adapter.
//!
//! Native symbols are lowercase underscore pairs (`btc_usd`). Signed calls
//! carry an HMAC-SHA512 hex signature over the form body and a nonce from
//! the injected [`NonceStore`]: the venue caps nonces at 32 bits, so the
//! counter is seeded from the scaled wall clock (see
//! [`decisecond_nonce_seed`]) instead of raw microseconds. Responses use a
//! `{"success": 1, "return": ...}` envelope, and "no orders" arrives as an
//! error string that normalizes to an empty list.
//!
//! The venue reports available funds; totals are derived by adding back
//! what open orders tie up.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, hmac_sha512_hex, HttpTransport};
use crate::venue::nonce::{decisecond_nonce_seed, NonceStore};
use crate::venue::retry::{with_nonce_retry, NONCE_RETRY_ATTEMPTS};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, timestamp_from_epoch, BalanceKind, BalanceReport, OpenOrder, OrderBook,
    Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Btce;
const PUBLIC_URL: &str = "https://btc-e.com/api/2";
const TRADE_URL: &str = "https://btc-e.com/tapi";

const NONCE_REJECTED: &str = "invalid nonce parameter";
const NO_ORDERS: &str = "no orders";

/// Venue constraints for order placement.
const PRICE_SCALE: u32 = 3;
const AMOUNT_SCALE: u32 = 2;

/// Lowercase underscore symbols (`btc_usd`).
pub struct BtcePairs;

impl PairFormatter for BtcePairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        Ok(format!("{}_{}", pair.base().code(), pair.quote().code()).to_lowercase())
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let symbol = native.trim().to_uppercase();
        let (base, quote) = symbol
            .split_once('_')
            .ok_or_else(|| self.bad_native_symbol(native))?;
        let base = Currency::from_code(base).ok_or_else(|| self.bad_native_symbol(native))?;
        let quote = Currency::from_code(quote).ok_or_else(|| self.bad_native_symbol(native))?;
        CanonicalPair::new(base, quote).map_err(|e| VenueError::new(VENUE, e))
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

/// Unwrap the `{"success": 1, "return": ...}` envelope. The venue's error
/// string is surfaced verbatim so callers can match on markers like
/// "no orders".
fn unwrap_return(response: Value) -> VenueResult<Value> {
    if response.get("success").and_then(Value::as_i64) == Some(1) {
        return response
            .get("return")
            .cloned()
            .ok_or_else(|| malformed("success without return", &response));
    }
    if let Some(error) = response.get("error") {
        return Err(VenueError::new(VENUE, as_text(error)));
    }
    Err(malformed(
        "response not successful but also not erroneous",
        &response,
    ))
}

fn ticker_from(tick: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
    let field = |key: &str| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    let timestamp = tick
        .get("updated")
        .and_then(timestamp_from_epoch)
        .unwrap_or_else(Utc::now);
    // the venue labels prices from the taker's side: its "buy" is the
    // price you buy at (our ask), its "sell" the price you sell at
    Ok(Ticker::from_parts(
        field("sell")?,
        field("buy")?,
        field("high")?,
        field("low")?,
        field("last")?,
        field("vol_cur")?,
        pair.quote(),
        pair.base(),
        timestamp,
    ))
}

fn funds_from(info: &Value) -> VenueResult<MultiMoney> {
    let funds = info
        .get("funds")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("info without funds", info))?;
    let mut available = MultiMoney::new();
    for (code, amount) in funds {
        let (Some(currency), Some(amount)) = (Currency::from_code(code), as_decimal(amount))
        else {
            continue;
        };
        available += Money::new(amount, currency);
    }
    Ok(available)
}

fn open_orders_from(result: &Value, native: Option<&str>) -> VenueResult<Vec<OpenOrder>> {
    let Some(orders) = result.as_object() else {
        return Err(malformed("expected order map", result));
    };
    let pairs = BtcePairs;
    let mut out = Vec::new();
    for (order_id, order) in orders {
        let order_pair = order.get("pair").and_then(Value::as_str).unwrap_or_default();
        if native.is_some_and(|n| n != order_pair) {
            continue;
        }
        let Ok(canonical) = pairs.to_canonical(order_pair) else {
            // a pair outside the known currency set is not ours to report
            continue;
        };
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
        out.push(OpenOrder {
            price: Money::new(rate, canonical.quote()),
            amount: Money::new(amount, canonical.base()),
            side,
            venue: VENUE,
            order_id: order_id.clone(),
        });
    }
    Ok(out)
}

fn tied_up(orders: &[OpenOrder]) -> MultiMoney {
    orders.iter().map(OpenOrder::tied_up).collect()
}

/// btce client.
pub struct Btce {
    http: HttpTransport,
    key: String,
    secret: String,
    nonces: Arc<dyn NonceStore>,
    pairs: BtcePairs,
    block_orders: bool,
}

impl Btce {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        nonces: Arc<dyn NonceStore>,
        block_orders: bool,
    ) -> Btce {
        // idempotent: an existing counter (possibly durable) wins
        nonces.initialize(VENUE, decisecond_nonce_seed(SystemTime::now()));
        Btce {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            nonces,
            pairs: BtcePairs,
            block_orders,
        }
    }

    async fn public(&self, native: &str, method: &str) -> VenueResult<Value> {
        let url = format!("{}/{}/{}", PUBLIC_URL, native, method);
        self.http.get(VENUE, &url, &[]).await
    }

    async fn private(&self, method: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        with_nonce_retry(
            NONCE_RETRY_ATTEMPTS,
            |e| e.message.contains(NONCE_REJECTED),
            || self.private_once(method, params),
        )
        .await
    }

    async fn private_once(&self, method: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let nonce = self.nonces.next(VENUE);

        let mut form: Vec<(&str, String)> = vec![
            ("method", method.to_string()),
            ("nonce", nonce.to_string()),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let body = build_query_string(&form);

        let signature = hmac_sha512_hex(self.secret.as_bytes(), body.as_bytes());
        let headers = [("Key", self.key.clone()), ("Sign", signature)];

        let response = self.http.post_form(VENUE, TRADE_URL, body, &headers).await?;
        unwrap_return(response)
    }

    async fn active_orders(&self, native: Option<&str>) -> VenueResult<Vec<OpenOrder>> {
        let params: Vec<(&str, String)> = match native {
            Some(native) => vec![("pair", native.to_string())],
            None => Vec::new(),
        };
        match self.private("ActiveOrders", &params).await {
            Ok(result) => open_orders_from(&result, native),
            // the venue reports an empty book as an error string
            Err(err) if err.message == NO_ORDERS => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Exchange for Btce {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let native = self.pairs.to_venue(pair)?;
        let response = self.public(&native, "ticker").await?;
        let tick = response
            .get("ticker")
            .ok_or_else(|| malformed("no ticker in response", &response))?;
        ticker_from(tick, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let native = self.pairs.to_venue(pair)?;
        let book = self.public(&native, "depth").await?;
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
        let info = self.private("getInfo", &[]).await?;
        let available = funds_from(&info)?;
        if let BalanceKind::Available = kind {
            return Ok(BalanceReport::Available(available));
        }

        // the venue reports free funds; totals include what orders claim
        let tied = tied_up(&self.active_orders(None).await?);
        let total = available.clone() + tied;
        Ok(if let BalanceKind::Total = kind {
            BalanceReport::Total(total)
        } else {
            BalanceReport::Both { total, available }
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let native = self.pairs.to_venue(pair)?;
        self.active_orders(Some(&native)).await
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
        let native = self.pairs.to_venue(pair)?;
        let side = match side {
            Side::Bid => "buy",
            Side::Ask => "sell",
        };
        let params = [
            ("pair", native),
            ("type", side.to_string()),
            ("rate", price.round_dp(PRICE_SCALE).to_string()),
            ("amount", amount.round_dp(AMOUNT_SCALE).to_string()),
        ];
        let result = self.private("Trade", &params).await?;
        result
            .get("order_id")
            .map(as_text)
            .ok_or_else(|| malformed("order accepted without order_id", &result))
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let result = self
            .private("CancelOrder", &[("order_id", order_id.to_string())])
            .await?;
        Ok(result.get("order_id").is_some())
    }

    async fn get_deposit_address(&self, _currency: Currency) -> VenueResult<String> {
        Err(VenueError::new(
            VENUE,
            "deposit address lookup not supported",
        ))
    }

    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value> {
        let native = self.pairs.to_venue(pair)?;
        self.private("TradeHistory", &[("pair", native)]).await
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
    fn test_pair_round_trip() {
        let pairs = BtcePairs;
        for canonical in ["BTC_USD", "LTC_BTC", "BTC_EUR", "DASH_BTC"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
        }
        assert_eq!(pairs.to_venue(&pair("BTC_USD")).unwrap(), "btc_usd");
        assert!(pairs.to_canonical("btcusd").is_err());
    }

    #[test]
    fn test_envelope_unwrapping() {
        let ok = unwrap_return(json!({"success": 1, "return": {"funds": {}}})).unwrap();
        assert_eq!(ok, json!({"funds": {}}));

        let err = unwrap_return(json!({"success": 0, "error": "no orders"})).unwrap_err();
        assert_eq!(err.message, "no orders");

        let odd = unwrap_return(json!({"surprise": true})).unwrap_err();
        assert!(odd.message.contains("not successful"));
    }

    #[test]
    fn test_ticker_swaps_buy_and_sell() {
        let tick = json!({
            "high": 250.0, "low": 238.0, "avg": 245.0, "vol": 372000.0,
            "vol_cur": 1531.2, "last": 243.5, "buy": 243.9, "sell": 243.1,
            "updated": 1414170000
        });
        let ticker = ticker_from(&tick, &pair("BTC_USD")).unwrap();
        // venue "buy" is our ask, venue "sell" our bid
        assert_eq!(ticker.ask.amount(), dec!(243.9));
        assert_eq!(ticker.bid.amount(), dec!(243.1));
        assert_eq!(ticker.volume.amount(), dec!(1531.2));
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    #[test]
    fn test_balance_total_is_available_plus_tied() {
        let available = funds_from(&json!({
            "funds": {"btc": 1.0, "usd": 500.0, "ltc": 0.0, "nmc": 12.0}
        }))
        .unwrap();
        // nmc is outside the known set, zero entries are dropped
        assert_eq!(available.len(), 2);

        let orders = open_orders_from(
            &json!({
                "1001": {"pair": "btc_usd", "type": "buy", "amount": 0.5, "rate": 100.0},
                "1002": {"pair": "btc_usd", "type": "sell", "amount": 0.25, "rate": 900.0}
            }),
            Some("btc_usd"),
        )
        .unwrap();
        let total = available.clone() + tied_up(&orders);

        // bid ties 50 USD, ask ties 0.25 BTC
        assert_eq!(total.get(Currency::Usd).amount(), dec!(550.0));
        assert_eq!(total.get(Currency::Btc).amount(), dec!(1.25));
    }

    #[test]
    fn test_open_orders_filter_by_pair() {
        let result = json!({
            "7": {"pair": "ltc_usd", "type": "sell", "amount": 3.0, "rate": 5.0}
        });
        assert!(open_orders_from(&result, Some("btc_usd")).unwrap().is_empty());

        let orders = open_orders_from(&result, Some("ltc_usd")).unwrap();
        assert_eq!(orders[0].amount, Money::new(dec!(3.0), Currency::Ltc));
        assert_eq!(orders[0].side, Side::Ask);
    }
}
