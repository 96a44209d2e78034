//! bitstamp venue adapter.
//!
//! bitstamp runs a single BTC/USD market, so the pair mapping is the
//! identity onto `btcusd` and anything else is unsupported. Requests are
//! signed with HMAC-SHA256 over `nonce + client id + key`, uppercase hex,
//! with the customer id coming from configuration. The venue reports total
//! balances only; available funds are derived from open orders.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, hmac_sha256_hex, HttpTransport};
use crate::venue::nonce::microsecond_nonce;
use crate::venue::retry::{with_nonce_retry, NONCE_RETRY_ATTEMPTS};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, timestamp_from_epoch, BalanceKind, BalanceReport, OpenOrder, OrderBook,
    Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Bitstamp;
const BASE_URL: &str = "https://www.bitstamp.net/api";

const NONCE_REJECTED: &str = "Invalid nonce";

/// Venue constraints, from bitstamp's published trading rules.
const PRICE_SCALE: u32 = 2;
const AMOUNT_SCALE: u32 = 8;
/// Smallest order the venue accepts, as quote notional.
const MIN_ORDER_USD: Decimal = rust_decimal_macros::dec!(5);

/// bitstamp trades one market.
pub struct BitstampPairs;

impl PairFormatter for BitstampPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        if pair.base() == Currency::Btc && pair.quote() == Currency::Usd {
            Ok("btcusd".to_string())
        } else {
            Err(self.unsupported_pair(pair))
        }
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        if native.trim().to_lowercase() == "btcusd" {
            CanonicalPair::new(Currency::Btc, Currency::Usd)
                .map_err(|e| VenueError::new(VENUE, e))
        } else {
            Err(self.bad_native_symbol(native))
        }
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

fn ticker_from(tick: &Value) -> VenueResult<Ticker> {
    let field = |key: &str| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    let timestamp = tick
        .get("timestamp")
        .and_then(timestamp_from_epoch)
        .unwrap_or_else(Utc::now);
    Ok(Ticker::from_parts(
        field("bid")?,
        field("ask")?,
        field("high")?,
        field("low")?,
        field("last")?,
        field("volume")?,
        Currency::Usd,
        Currency::Btc,
        timestamp,
    ))
}

fn total_from(balance: &Value) -> VenueResult<MultiMoney> {
    let field = |key: &str| -> VenueResult<Decimal> {
        balance
            .get(key)
            .and_then(as_decimal)
            .ok_or_else(|| VenueError::new(VENUE, "balance information unavailable"))
    };
    let mut total = MultiMoney::new();
    total += Money::new(field("btc_balance")?, Currency::Btc);
    total += Money::new(field("usd_balance")?, Currency::Usd);
    Ok(total)
}

fn open_orders_from(raw: &Value) -> VenueResult<Vec<OpenOrder>> {
    let Some(list) = raw.as_array() else {
        return Err(malformed("expected order list", raw));
    };
    let mut orders = Vec::new();
    for order in list {
        // type: 0 buy, 1 sell
        let side = match order.get("type").and_then(Value::as_i64) {
            Some(0) => Side::Bid,
            Some(1) => Side::Ask,
            _ => return Err(malformed("order without side", order)),
        };
        let price = order
            .get("price")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without price", order))?;
        let amount = order
            .get("amount")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without amount", order))?;
        let order_id = order
            .get("id")
            .map(as_text)
            .ok_or_else(|| malformed("order without id", order))?;
        orders.push(OpenOrder {
            price: Money::new(price, Currency::Usd),
            amount: Money::new(amount, Currency::Btc),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

fn tied_up(orders: &[OpenOrder]) -> MultiMoney {
    orders.iter().map(OpenOrder::tied_up).collect()
}

/// bitstamp client.
pub struct Bitstamp {
    http: HttpTransport,
    key: String,
    secret: String,
    client_id: String,
    pairs: BitstampPairs,
    block_orders: bool,
}

impl Bitstamp {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> VenueResult<Bitstamp> {
        let client_id = credentials
            .client_id
            .clone()
            .ok_or_else(|| VenueError::new(VENUE, "client_id is required for signing"))?;
        Ok(Bitstamp {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            client_id,
            pairs: BitstampPairs,
            block_orders,
        })
    }

    async fn public(&self, path: &str) -> VenueResult<Value> {
        let url = format!("{}/{}/", BASE_URL, path);
        let value = self.http.get(VENUE, &url, &[]).await?;
        fail_on_error(value)
    }

    async fn private(&self, path: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        with_nonce_retry(
            NONCE_RETRY_ATTEMPTS,
            |e| e.message.contains(NONCE_REJECTED),
            || self.private_once(path, params),
        )
        .await
    }

    async fn private_once(&self, path: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        // the venue's convention counts in 10 microsecond ticks
        let nonce = microsecond_nonce() / 10;
        let message = format!("{}{}{}", nonce, self.client_id, self.key);
        let signature = hmac_sha256_hex(self.secret.as_bytes(), message.as_bytes()).to_uppercase();

        let mut form: Vec<(&str, String)> = vec![
            ("key", self.key.clone()),
            ("nonce", nonce.to_string()),
            ("signature", signature),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let url = format!("{}/{}/", BASE_URL, path);
        let body = build_query_string(&form);
        let value = self.http.post_form(VENUE, &url, body, &[]).await?;
        fail_on_error(value)
    }

    async fn open_orders(&self) -> VenueResult<Vec<OpenOrder>> {
        let raw = self.private("open_orders", &[]).await?;
        open_orders_from(&raw)
    }
}

/// bitstamp signals failure with an `error` field inside an otherwise
/// normal body.
fn fail_on_error(value: Value) -> VenueResult<Value> {
    if let Some(error) = value.get("error") {
        return Err(VenueError::new(VENUE, as_text(error)));
    }
    Ok(value)
}

#[async_trait]
impl Exchange for Bitstamp {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        self.pairs.to_venue(pair)?;
        let tick = self.public("ticker").await?;
        ticker_from(&tick)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        self.pairs.to_venue(pair)?;
        let book = self.public("order_book").await?;
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
        let total = total_from(&self.private("balance", &[]).await?)?;
        if let BalanceKind::Total = kind {
            return Ok(BalanceReport::Total(total));
        }

        // the venue reports totals only; subtract what open orders claim
        let available = total.clone() - tied_up(&self.open_orders().await?);
        Ok(if let BalanceKind::Available = kind {
            BalanceReport::Available(available)
        } else {
            BalanceReport::Both { total, available }
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        self.pairs.to_venue(pair)?;
        self.open_orders().await
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
        self.pairs.to_venue(pair)?;

        let price = price.round_dp(PRICE_SCALE);
        let amount = amount.round_dp(AMOUNT_SCALE);
        if price * amount < MIN_ORDER_USD {
            return Err(VenueError::new(
                VENUE,
                format!("order below venue minimum of {} USD", MIN_ORDER_USD),
            ));
        }

        let endpoint = match side {
            Side::Bid => "buy",
            Side::Ask => "sell",
        };
        let params = [
            ("amount", amount.to_string()),
            ("price", price.to_string()),
        ];
        let response = self.private(endpoint, &params).await?;
        response
            .get("id")
            .map(as_text)
            .ok_or_else(|| malformed("order accepted without id", &response))
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let response = self
            .private("cancel_order", &[("id", order_id.to_string())])
            .await?;
        Ok(match response {
            Value::Bool(confirmed) => confirmed,
            Value::Null => false,
            _ => true,
        })
    }

    async fn get_deposit_address(&self, _currency: Currency) -> VenueResult<String> {
        Err(VenueError::new(
            VENUE,
            "deposit address lookup not supported",
        ))
    }

    async fn get_trade_history(&self, _pair: &CanonicalPair) -> VenueResult<Value> {
        self.private("user_transactions", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn btc_usd() -> CanonicalPair {
        "BTC_USD".parse().unwrap()
    }

    #[test]
    fn test_single_market_mapping() {
        let pairs = BitstampPairs;
        assert_eq!(pairs.to_venue(&btc_usd()).unwrap(), "btcusd");
        assert_eq!(pairs.to_canonical("btcusd").unwrap(), btc_usd());
        assert_eq!(pairs.to_canonical("BTCUSD").unwrap(), btc_usd());
        assert!(pairs.to_venue(&"BTC_EUR".parse().unwrap()).is_err());
        assert!(pairs.to_canonical("btceur").is_err());
    }

    #[test]
    fn test_ticker_parsing() {
        let tick = json!({
            "last": "245.12", "high": "249.90", "low": "240.00",
            "volume": "1823.5", "bid": "245.00", "ask": "245.30",
            "timestamp": "1414170000"
        });
        let ticker = ticker_from(&tick).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(245.00));
        assert_eq!(ticker.bid.currency(), Currency::Usd);
        assert_eq!(ticker.volume.amount(), dec!(1823.5));
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    #[test]
    fn test_balance_identity_against_open_orders() {
        let total = total_from(&json!({
            "btc_balance": "2.0",
            "usd_balance": "1000.00"
        }))
        .unwrap();

        let orders = open_orders_from(&json!([
            {"id": 11, "type": 0, "price": "200.00", "amount": "1.0"},
            {"id": 12, "type": 1, "price": "400.00", "amount": "0.5"}
        ]))
        .unwrap();

        let available = total.clone() - tied_up(&orders);
        // the bid ties 200 USD, the ask ties 0.5 BTC
        assert_eq!(available.get(Currency::Usd).amount(), dec!(800.00));
        assert_eq!(available.get(Currency::Btc).amount(), dec!(1.5));

        // Total - Available equals the open-order notional
        let claimed = total - available;
        assert_eq!(claimed.get(Currency::Usd).amount(), dec!(200.00));
        assert_eq!(claimed.get(Currency::Btc).amount(), dec!(0.5));
    }

    #[test]
    fn test_open_orders_side_vocabulary() {
        let orders = open_orders_from(&json!([
            {"id": "7", "type": 0, "price": "10.00", "amount": "1"}
        ]))
        .unwrap();
        assert_eq!(orders[0].side, Side::Bid);
        assert_eq!(orders[0].order_id, "7");

        assert!(open_orders_from(&json!([{"id": 1, "type": 5}])).is_err());
    }

    #[test]
    fn test_error_field_is_verbatim() {
        let err = fail_on_error(json!({"error": "Invalid nonce"})).unwrap_err();
        assert_eq!(err.message, "Invalid nonce");

        assert!(fail_on_error(json!({"bids": []})).is_ok());
    }
}
