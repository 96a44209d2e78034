//! exmo venue adapter.
//!
//! The native symbols are uppercase underscore pairs, so the mapping to
//! canonical form is nearly the identity. Signed calls are HMAC-SHA512 hex
//! over the form body with a millisecond nonce. The venue reports
//! available and reserved funds separately, which gives both balance
//! figures in one call, and keys open orders by pair, with an absent key
//! meaning no orders.

use async_trait::async_trait;
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
    as_decimal, as_text, timestamp_from_epoch, BalanceKind, BalanceReport, OpenOrder, OrderBook,
    Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Exmo;
const BASE_URL: &str = "https://api.exmo.com/v1";

const NONCE_REJECTED: &str = "Nonce";

/// Uppercase underscore symbols (`BTC_USD`, `DASH_BTC`).
pub struct ExmoPairs;

impl PairFormatter for ExmoPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        Ok(format!("{}_{}", pair.base().code(), pair.quote().code()))
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

/// exmo marks failure with `"result": false` and an `error` string.
fn fail_on_error(value: Value) -> VenueResult<Value> {
    if value.get("result").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("error")
            .map(as_text)
            .unwrap_or_else(|| value.to_string());
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
        .get("updated")
        .and_then(timestamp_from_epoch)
        .ok_or_else(|| malformed("ticker without timestamp", tick))?;
    Ok(Ticker::from_parts(
        field("buy_price")?,
        field("sell_price")?,
        field("high")?,
        field("low")?,
        field("last_trade")?,
        field("vol")?,
        pair.quote(),
        pair.base(),
        timestamp,
    ))
}

fn money_map(value: Option<&Value>) -> MultiMoney {
    let mut out = MultiMoney::new();
    if let Some(entries) = value.and_then(Value::as_object) {
        for (code, amount) in entries {
            let (Some(currency), Some(amount)) = (Currency::from_code(code), as_decimal(amount))
            else {
                continue;
            };
            out += Money::new(amount, currency);
        }
    }
    out
}

fn open_orders_from(raw: &Value, native: &str, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
    // an absent pair key means no orders on that book
    let Some(list) = raw.get(native).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut orders = Vec::new();
    for order in list {
        let side = order
            .get("type")
            .and_then(Value::as_str)
            .and_then(Side::from_buy_sell)
            .ok_or_else(|| malformed("order without side", order))?;
        let price = order
            .get("price")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without price", order))?;
        let quantity = order
            .get("quantity")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without quantity", order))?;
        let order_id = order
            .get("order_id")
            .map(as_text)
            .ok_or_else(|| malformed("order without id", order))?;
        orders.push(OpenOrder {
            price: Money::new(price, pair.quote()),
            amount: Money::new(quantity, pair.base()),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

/// exmo client.
pub struct Exmo {
    http: HttpTransport,
    key: String,
    secret: String,
    pairs: ExmoPairs,
    block_orders: bool,
}

impl Exmo {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> Exmo {
        Exmo {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            pairs: ExmoPairs,
            block_orders,
        }
    }

    async fn public(&self, endpoint: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let url = format!("{}/{}/", BASE_URL, endpoint);
        let value = self.http.get(VENUE, &url, params).await?;
        fail_on_error(value)
    }

    async fn private(&self, endpoint: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        with_nonce_retry(
            NONCE_RETRY_ATTEMPTS,
            |e| e.message.contains(NONCE_REJECTED),
            || self.private_once(endpoint, params),
        )
        .await
    }

    async fn private_once(&self, endpoint: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let nonce = millisecond_nonce();
        let mut form: Vec<(&str, String)> = params.iter().map(|(k, v)| (*k, v.clone())).collect();
        form.push(("nonce", nonce.to_string()));
        let body = build_query_string(&form);

        let signature = hmac_sha512_hex(self.secret.as_bytes(), body.as_bytes());
        let headers = [("Key", self.key.clone()), ("Sign", signature)];

        let url = format!("{}/{}/", BASE_URL, endpoint);
        let value = self.http.post_form(VENUE, &url, body, &headers).await?;
        fail_on_error(value)
    }
}

#[async_trait]
impl Exchange for Exmo {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let native = self.pairs.to_venue(pair)?;
        let response = self.public("ticker", &[]).await?;
        let tick = response
            .get(&native)
            .ok_or_else(|| malformed("ticker missing pair", &response))?;
        ticker_from(tick, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let native = self.pairs.to_venue(pair)?;
        let response = self
            .public("order_book", &[("pair", native.clone())])
            .await?;
        let book = response
            .get(&native)
            .ok_or_else(|| malformed("order book missing pair", &response))?;
        // the venue spells the sides "ask"/"bid"
        Ok(OrderBook {
            bids: book
                .get("bid")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            asks: book
                .get("ask")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn get_balance(&self, kind: BalanceKind) -> VenueResult<BalanceReport> {
        let info = self.private("user_info", &[]).await?;
        let available = money_map(info.get("balances"));
        let reserved = money_map(info.get("reserved"));
        let total = available.clone() + reserved;
        Ok(match kind {
            BalanceKind::Total => BalanceReport::Total(total),
            BalanceKind::Available => BalanceReport::Available(available),
            BalanceKind::Both => BalanceReport::Both { total, available },
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let native = self.pairs.to_venue(pair)?;
        let raw = self.private("user_open_orders", &[]).await?;
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
        let params = [
            ("pair", native),
            ("quantity", amount.to_string()),
            ("price", price.to_string()),
            ("type", side.to_string()),
        ];
        let order = self.private("order_create", &params).await?;
        match order.get("order_id") {
            Some(order_id) if !order_id.is_null() => Ok(as_text(order_id)),
            _ => Err(malformed("order accepted without id", &order)),
        }
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let params = [("order_id", order_id.to_string())];
        match self.private("order_cancel", &params).await {
            Ok(response) => {
                Ok(response.get("result").and_then(Value::as_bool) == Some(true))
            }
            // already-gone reads as success, per the contract
            Err(err) if err.message == "Order could not be cancelled." => Ok(true),
            Err(err) => Err(err),
        }
    }

    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String> {
        let addresses = self.private("deposit_address", &[]).await?;
        addresses
            .get(currency.code())
            .and_then(Value::as_str)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                VenueError::new(VENUE, format!("no deposit address for {}", currency))
            })
    }

    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value> {
        let native = self.pairs.to_venue(pair)?;
        self.private("user_trades", &[("pair", native)]).await
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
        let pairs = ExmoPairs;
        for canonical in ["BTC_USD", "DASH_BTC", "DASH_USD", "LTC_EUR", "BTC_RUB"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(native, canonical);
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
        }
    }

    #[test]
    fn test_base_and_quote_extraction() {
        let p: CanonicalPair = pair("DASH_BTC");
        assert_eq!(p.base(), Currency::Dash);
        assert_eq!(p.quote(), Currency::Btc);
    }

    #[test]
    fn test_ticker_parsing() {
        let tick = json!({
            "buy_price": "0.0265", "sell_price": "0.0267",
            "last_trade": "0.0266", "high": "0.0270", "low": "0.0255",
            "vol": "4521.3", "vol_curr": "120.2", "updated": 1414170000
        });
        let ticker = ticker_from(&tick, &pair("DASH_BTC")).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(0.0265));
        assert_eq!(ticker.ask.amount(), dec!(0.0267));
        assert_eq!(ticker.bid.currency(), Currency::Btc);
        assert_eq!(ticker.volume.amount(), dec!(4521.3));
        assert_eq!(ticker.volume.currency(), Currency::Dash);
    }

    #[test]
    fn test_balances_split_available_and_reserved() {
        let info = json!({
            "uid": 1,
            "balances": {"BTC": "2.0", "USD": "350.0", "XYZ": "9"},
            "reserved": {"BTC": "0.5", "USD": "0"}
        });
        let available = money_map(info.get("balances"));
        let reserved = money_map(info.get("reserved"));
        let total = available.clone() + reserved;

        assert_eq!(available.get(Currency::Btc).amount(), dec!(2.0));
        assert_eq!(total.get(Currency::Btc).amount(), dec!(2.5));
        assert_eq!(total.get(Currency::Usd).amount(), dec!(350.0));
        // unknown codes are skipped
        assert_eq!(total.len(), 2);
    }

    #[test]
    fn test_missing_pair_key_means_no_orders() {
        let raw = json!({"BTC_USD": [
            {"order_id": 14, "type": "buy", "price": "100", "quantity": "1", "amount": "100"}
        ]});
        assert!(open_orders_from(&raw, "DASH_BTC", &pair("DASH_BTC"))
            .unwrap()
            .is_empty());

        let orders = open_orders_from(&raw, "BTC_USD", &pair("BTC_USD")).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, Side::Bid);
        assert_eq!(orders[0].amount, Money::new(dec!(1), Currency::Btc));
        assert_eq!(orders[0].order_id, "14");
    }

    #[test]
    fn test_result_false_is_an_error() {
        let err = fail_on_error(json!({"result": false, "error": "Error 50052: Insufficient funds"}))
            .unwrap_err();
        assert_eq!(err.message, "Error 50052: Insufficient funds");

        // result true passes through
        assert!(fail_on_error(json!({"result": true, "order_id": 7})).is_ok());
        // public payloads without a result field pass through
        assert!(fail_on_error(json!({"BTC_USD": {}})).is_ok());
    }
}
