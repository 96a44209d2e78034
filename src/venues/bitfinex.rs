//! bitfinex venue adapter.
//!
//! Native symbols are plain lowercase concatenation (`btcusd`). Private
//! calls carry their parameters in a base64 JSON payload header signed
//! with HMAC-SHA384; the venue signals errors with a `message` field and
//! rejects stale nonces with "Nonce is too small.". Book entries are
//! object-shaped, so this adapter overrides the default item formatter.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{hmac_sha384_hex, HttpTransport};
use crate::venue::nonce::microsecond_nonce;
use crate::venue::retry::{with_nonce_retry, NONCE_RETRY_ATTEMPTS};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, timestamp_from_epoch, BalanceKind, BalanceReport, OpenOrder, OrderBook,
    OrderbookItem, Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Bitfinex;
const BASE_URL: &str = "https://api.bitfinex.com";

const NONCE_REJECTED: &str = "Nonce is too small.";

/// Venue constraints: bitfinex accepts at most three decimals on order
/// fields.
const PRICE_SCALE: u32 = 3;
const AMOUNT_SCALE: u32 = 3;

/// Concatenated lowercase symbols, three letters a side.
pub struct BitfinexPairs;

impl PairFormatter for BitfinexPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        let base = pair.base().code();
        let quote = pair.quote().code();
        if base.len() != 3 || quote.len() != 3 {
            return Err(self.unsupported_pair(pair));
        }
        Ok(format!("{}{}", base, quote).to_lowercase())
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let symbol = native.trim().to_uppercase();
        if symbol.len() != 6 {
            return Err(self.bad_native_symbol(native));
        }
        let base = Currency::from_code(&symbol[..3])
            .filter(|c| c.code().len() == 3)
            .ok_or_else(|| self.bad_native_symbol(native))?;
        let quote = Currency::from_code(&symbol[3..])
            .filter(|c| c.code().len() == 3)
            .ok_or_else(|| self.bad_native_symbol(native))?;
        CanonicalPair::new(base, quote).map_err(|e| VenueError::new(VENUE, e))
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

/// bitfinex reports business errors as `{"message": "..."}`.
fn fail_on_message(value: Value) -> VenueResult<Value> {
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return Err(VenueError::new(VENUE, message));
    }
    Ok(value)
}

fn ticker_from(tick: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
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
        field("last_price")?,
        field("volume")?,
        pair.quote(),
        pair.base(),
        timestamp,
    ))
}

fn balances_from(raw: &Value) -> VenueResult<(MultiMoney, MultiMoney)> {
    let Some(entries) = raw.as_array() else {
        return Err(malformed("expected balance list", raw));
    };
    let mut total = MultiMoney::new();
    let mut available = MultiMoney::new();
    for entry in entries {
        let Some(currency) = entry
            .get("currency")
            .and_then(Value::as_str)
            .and_then(Currency::from_code)
        else {
            continue;
        };
        if let Some(amount) = entry.get("amount").and_then(as_decimal) {
            total += Money::new(amount, currency);
        }
        if let Some(amount) = entry.get("available").and_then(as_decimal) {
            available += Money::new(amount, currency);
        }
    }
    Ok((total, available))
}

fn open_orders_from(raw: &Value, native: &str, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
    let Some(list) = raw.as_array() else {
        return Err(malformed("expected order list", raw));
    };
    let mut orders = Vec::new();
    for order in list {
        if order.get("symbol").and_then(Value::as_str) != Some(native) {
            continue;
        }
        let side = order
            .get("side")
            .and_then(Value::as_str)
            .and_then(Side::from_buy_sell)
            .ok_or_else(|| malformed("order without side", order))?;
        let price = order
            .get("price")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without price", order))?;
        let remaining = order
            .get("remaining_amount")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without remaining amount", order))?;
        let order_id = order
            .get("id")
            .map(as_text)
            .ok_or_else(|| malformed("order without id", order))?;
        orders.push(OpenOrder {
            price: Money::new(price, pair.quote()),
            amount: Money::new(remaining, pair.base()),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

/// bitfinex client.
pub struct Bitfinex {
    http: HttpTransport,
    key: String,
    secret: String,
    pairs: BitfinexPairs,
    block_orders: bool,
}

impl Bitfinex {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> VenueResult<Bitfinex> {
        Ok(Bitfinex {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            pairs: BitfinexPairs,
            block_orders,
        })
    }

    async fn public(&self, path: &str) -> VenueResult<Value> {
        let url = format!("{}{}", BASE_URL, path);
        let value = self.http.get(VENUE, &url, &[]).await?;
        fail_on_message(value)
    }

    async fn private(&self, path: &str, params: Map<String, Value>) -> VenueResult<Value> {
        with_nonce_retry(
            NONCE_RETRY_ATTEMPTS,
            |e| e.message.contains(NONCE_REJECTED),
            || self.private_once(path, params.clone()),
        )
        .await
    }

    async fn private_once(&self, path: &str, mut params: Map<String, Value>) -> VenueResult<Value> {
        params.insert("request".to_string(), json!(path));
        params.insert("nonce".to_string(), json!(microsecond_nonce().to_string()));

        let payload = BASE64.encode(Value::Object(params).to_string());
        let signature = hmac_sha384_hex(self.secret.as_bytes(), payload.as_bytes());

        let headers = [
            ("X-BFX-APIKEY", self.key.clone()),
            ("X-BFX-PAYLOAD", payload),
            ("X-BFX-SIGNATURE", signature),
        ];
        let url = format!("{}{}", BASE_URL, path);
        let value = self
            .http
            .post_form(VENUE, &url, String::new(), &headers)
            .await?;
        fail_on_message(value)
    }
}

#[async_trait]
impl Exchange for Bitfinex {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let native = self.pairs.to_venue(pair)?;
        let tick = self.public(&format!("/v1/pubticker/{}", native)).await?;
        ticker_from(&tick, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let native = self.pairs.to_venue(pair)?;
        let book = self.public(&format!("/v1/book/{}", native)).await?;
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

    /// bitfinex book entries are objects, not `[price, size]` arrays.
    fn format_book_item(&self, entry: &Value) -> VenueResult<OrderbookItem> {
        let price = entry
            .get("price")
            .and_then(as_decimal)
            .ok_or_else(|| self.malformed_book_item(entry))?;
        let amount = entry
            .get("amount")
            .and_then(as_decimal)
            .ok_or_else(|| self.malformed_book_item(entry))?;
        Ok(OrderbookItem { price, amount })
    }

    async fn get_balance(&self, kind: BalanceKind) -> VenueResult<BalanceReport> {
        // the venue reports both figures per currency in one call
        let raw = self.private("/v1/balances", Map::new()).await?;
        let (total, available) = balances_from(&raw)?;
        Ok(match kind {
            BalanceKind::Total => BalanceReport::Total(total),
            BalanceKind::Available => BalanceReport::Available(available),
            BalanceKind::Both => BalanceReport::Both { total, available },
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let native = self.pairs.to_venue(pair)?;
        let raw = self.private("/v1/orders", Map::new()).await?;
        open_orders_from(&raw, &native, pair)
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

        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(native));
        params.insert(
            "amount".to_string(),
            json!(amount.round_dp(AMOUNT_SCALE).to_string()),
        );
        params.insert(
            "price".to_string(),
            json!(price.round_dp(PRICE_SCALE).to_string()),
        );
        params.insert("side".to_string(), json!(side));
        params.insert("type".to_string(), json!("exchange limit"));
        params.insert("exchange".to_string(), json!("all"));

        let order = self.private("/v1/order/new", params).await?;
        if order.get("is_live").and_then(Value::as_bool) == Some(true) {
            if let Some(order_id) = order.get("order_id").map(as_text) {
                return Ok(order_id);
            }
        }
        Err(malformed("unable to create order, response was", &order))
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let numeric_id: i64 = order_id
            .parse()
            .map_err(|_| VenueError::new(VENUE, format!("non-numeric order id {:?}", order_id)))?;

        let mut params = Map::new();
        params.insert("order_id".to_string(), json!(numeric_id));

        match self.private("/v1/order/cancel", params).await {
            Ok(response) => {
                Ok(response.get("id").and_then(Value::as_i64) == Some(numeric_id))
            }
            // already-gone reads as success, per the contract
            Err(err) if err.message == "Order could not be cancelled." => Ok(true),
            Err(err) => Err(err),
        }
    }

    async fn cancel_orders(&self, _pair: &CanonicalPair) -> VenueResult<bool> {
        let response = self.private("/v1/order/cancel/all", Map::new()).await?;
        Ok(as_text(&response).contains("All orders cancelled"))
    }

    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String> {
        if currency != Currency::Btc {
            return Err(VenueError::new(
                VENUE,
                format!("no deposit method for {}", currency),
            ));
        }
        let mut params = Map::new();
        params.insert("currency".to_string(), json!("BTC"));
        params.insert("method".to_string(), json!("bitcoin"));
        params.insert("wallet_name".to_string(), json!("exchange"));

        let result = self.private("/v1/deposit/new", params).await?;
        if result.get("result").and_then(Value::as_str) == Some("success") {
            if let Some(address) = result.get("address").and_then(Value::as_str) {
                return Ok(address.to_string());
            }
        }
        Err(malformed("no deposit address in response", &result))
    }

    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value> {
        let native = self.pairs.to_venue(pair)?;
        let mut params = Map::new();
        params.insert("symbol".to_string(), json!(native));
        self.private("/v1/mytrades", params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair(s: &str) -> CanonicalPair {
        s.parse().unwrap()
    }

    #[test]
    fn test_pair_round_trip() {
        let pairs = BitfinexPairs;
        for canonical in ["BTC_USD", "LTC_USD", "ETH_BTC", "LTC_BTC"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
        }
        assert_eq!(pairs.to_venue(&pair("BTC_USD")).unwrap(), "btcusd");
        assert!(pairs.to_venue(&pair("DASH_BTC")).is_err());
        assert!(pairs.to_canonical("xyzusd").is_err());
    }

    #[test]
    fn test_ticker_parsing() {
        let tick = serde_json::json!({
            "mid": "244.755",
            "bid": "244.75",
            "ask": "244.76",
            "last_price": "244.82",
            "low": "244.2",
            "high": "248.19",
            "volume": "7842.11",
            "timestamp": "1414170000.5"
        });
        let ticker = ticker_from(&tick, &pair("BTC_USD")).unwrap();
        assert_eq!(ticker.ask.amount(), dec!(244.76));
        assert_eq!(ticker.ask.currency(), Currency::Usd);
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    #[test]
    fn test_object_book_items() {
        let bitfinex = Bitfinex::new(
            &VenueCredentials::default(),
            HttpTransport::new(std::time::Duration::from_secs(1)).unwrap(),
            false,
        )
        .unwrap();

        let entry = serde_json::json!({"price": "203.50", "amount": "0.75", "timestamp": "1414170000.0"});
        let item = bitfinex.format_book_item(&entry).unwrap();
        assert_eq!(item.price, dec!(203.50));
        assert_eq!(item.amount, dec!(0.75));

        assert!(bitfinex.format_book_item(&serde_json::json!(["1", "2"])).is_err());
    }

    #[test]
    fn test_balances_report_both_sides() {
        let raw = serde_json::json!([
            {"type": "exchange", "currency": "usd", "amount": "1000.0", "available": "900.0"},
            {"type": "exchange", "currency": "btc", "amount": "2.0", "available": "1.5"},
            {"type": "exchange", "currency": "xyz", "amount": "5", "available": "5"}
        ]);
        let (total, available) = balances_from(&raw).unwrap();
        assert_eq!(total.get(Currency::Usd).amount(), dec!(1000.0));
        assert_eq!(available.get(Currency::Btc).amount(), dec!(1.5));
        // unknown currencies are skipped
        assert_eq!(total.len(), 2);
    }

    #[test]
    fn test_open_orders_filters_by_symbol() {
        let p = pair("BTC_USD");
        let raw = serde_json::json!([
            {"id": 448364249, "symbol": "btcusd", "price": "250.0",
             "side": "buy", "remaining_amount": "1.0", "is_live": true},
            {"id": 448364250, "symbol": "ltcusd", "price": "5.0",
             "side": "sell", "remaining_amount": "10.0", "is_live": true}
        ]);
        let orders = open_orders_from(&raw, "btcusd", &p).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Bid);
        assert_eq!(orders[0].price, Money::new(dec!(250.0), Currency::Usd));
        assert_eq!(orders[0].amount, Money::new(dec!(1.0), Currency::Btc));
        assert_eq!(orders[0].order_id, "448364249");
    }

    #[test]
    fn test_message_field_is_an_error() {
        let err = fail_on_message(serde_json::json!({"message": "Key is invalid"})).unwrap_err();
        assert_eq!(err.message, "Key is invalid");
    }
}
