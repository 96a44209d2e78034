//! huobi venue adapter.
//!
//! Trading goes through a single RPC-style endpoint where the method name
//! is a form field and the signature is MD5 over the sorted parameters
//! with the secret appended (the venue's scheme, not a choice made here).
//! Market data comes from separate static-market URLs. Books are CNY
//! quoted, selected by a numeric `coin_type`. The deposit address is a
//! static configured value; the venue has no lookup endpoint.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, md5_hex, HttpTransport};
use crate::venue::retry::{with_poll_retry, POLL_RETRY_ATTEMPTS, POLL_RETRY_DELAY};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, BalanceKind, BalanceReport, OpenOrder, OrderBook, Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Huobi;
const TRADE_URL: &str = "https://api.huobi.com/apiv2.php";
const MARKET_URL: &str = "https://market.huobi.com/staticmarket";

/// Venue constraints for order placement.
const PRICE_SCALE: u32 = 2;
const AMOUNT_SCALE: u32 = 4;
/// The venue's signing intermittently rejects round numbers; nudge them
/// off the integer before submitting.
const PRICE_NUDGE: Decimal = dec!(0.01);
const AMOUNT_NUDGE: Decimal = dec!(0.001);

/// The venue's documented error codes. Messages are surfaced verbatim so
/// callers can match on them.
const ERROR_CODES: &[(i64, &str)] = &[
    (1, "Server Error"),
    (2, "There is not enough yuan"),
    (3, "Transaction has started, can not be started again"),
    (4, "Transaction has ended"),
    (10, "There is not enough bitcoins"),
    (11, "Not enough LTC"),
    (18, "Incorrect payment password"),
    (26, "The order does not exist"),
    (41, "The order has ended, can not be modified"),
    (42, "The order has been canceled, can not be modified"),
    (44, "Transaction price is too low"),
    (45, "Transaction prices are too high"),
    (46, "The minimum order size is 0.001"),
    (47, "Too many requests"),
    (55, "10% higher than market price is not allowed"),
    (56, "10% lower than market price is not allowed"),
    (64, "Invalid request"),
    (65, "Invalid method"),
    (66, "Access key validation fails"),
    (67, "Private key authentication fails"),
    (68, "Invalid price"),
    (69, "Invalid amount"),
    (70, "Invalid submission time"),
    (71, "Request overflow"),
    (87, "Order price should not deviate from market price for small amounts"),
    (91, "Invalid type"),
    (92, "Buy price cannot be higher 10% than market price"),
    (93, "Sell price cannot be lower 10% than market price"),
    (97, "Please enter payment password"),
    (107, "Order is exist"),
];

/// CNY-quoted books selected by numeric coin type.
pub struct HuobiPairs;

fn coin_token(base: Currency) -> Option<&'static str> {
    match base {
        Currency::Btc => Some("btc"),
        Currency::Ltc => Some("ltc"),
        _ => None,
    }
}

fn coin_type(base: Currency) -> Option<u32> {
    match base {
        Currency::Btc => Some(1),
        Currency::Ltc => Some(2),
        _ => None,
    }
}

impl PairFormatter for HuobiPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        let token = coin_token(pair.base()).ok_or_else(|| self.unsupported_pair(pair))?;
        if pair.quote() != Currency::Cny {
            return Err(self.unsupported_pair(pair));
        }
        Ok(format!("{}_cny", token))
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let base = match native.trim().to_lowercase().as_str() {
            "btc_cny" => Currency::Btc,
            "ltc_cny" => Currency::Ltc,
            _ => return Err(self.bad_native_symbol(native)),
        };
        CanonicalPair::new(base, Currency::Cny).map_err(|e| VenueError::new(VENUE, e))
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

fn code_message(code: i64) -> String {
    ERROR_CODES
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, message)| message.to_string())
        .unwrap_or_else(|| format!("error code {}", code))
}

/// huobi marks failure with `"result": "fail"` and a numeric code.
fn fail_on_error(value: Value) -> VenueResult<Value> {
    if value.get("result").and_then(Value::as_str) == Some("fail") {
        let message = match value.get("code").and_then(Value::as_i64) {
            Some(code) => code_message(code),
            None => value.to_string(),
        };
        return Err(VenueError::new(VENUE, message));
    }
    Ok(value)
}

fn ticker_from(response: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
    let tick = response
        .get("ticker")
        .ok_or_else(|| malformed("no ticker in response", response))?;
    let field = |key: &str| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    Ok(Ticker::from_parts(
        field("buy")?,
        field("sell")?,
        field("high")?,
        field("low")?,
        field("last")?,
        field("vol")?,
        pair.quote(),
        pair.base(),
        Utc::now(),
    ))
}

fn balances_from(info: &Value) -> (MultiMoney, MultiMoney) {
    let mut available = MultiMoney::new();
    let mut frozen = MultiMoney::new();
    for (token, currency) in [
        ("btc", Currency::Btc),
        ("ltc", Currency::Ltc),
        ("cny", Currency::Cny),
    ] {
        let field = |prefix: &str| {
            info.get(format!("{}_{}_display", prefix, token))
                .and_then(as_decimal)
        };
        if let Some(amount) = field("available") {
            available += Money::new(amount, currency);
        }
        if let Some(amount) = field("frozen") {
            frozen += Money::new(amount, currency);
        }
    }
    (available, frozen)
}

fn open_orders_from(raw: &Value, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
    let Some(list) = raw.as_array() else {
        return Err(malformed("expected order list", raw));
    };
    let mut orders = Vec::new();
    for order in list {
        // type: 1 buy, 2 sell
        let side = match order.get("type").and_then(Value::as_i64) {
            Some(1) => Side::Bid,
            Some(2) => Side::Ask,
            _ => return Err(malformed("order without side", order)),
        };
        let price = order
            .get("order_price")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without price", order))?;
        let amount = order
            .get("order_amount")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without amount", order))?;
        let processed = order
            .get("processed_amount")
            .and_then(as_decimal)
            .unwrap_or_default();
        let order_id = order
            .get("id")
            .map(as_text)
            .ok_or_else(|| malformed("order without id", order))?;
        orders.push(OpenOrder {
            price: Money::new(price, pair.quote()),
            amount: Money::new(amount - processed, pair.base()),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

/// Nudge integral values off the round number the venue's signing chokes
/// on.
fn nudge_price(price: Decimal, side: Side) -> Decimal {
    if price.fract().is_zero() {
        match side {
            Side::Bid => price - PRICE_NUDGE,
            Side::Ask => price + PRICE_NUDGE,
        }
    } else {
        price
    }
}

fn nudge_amount(amount: Decimal) -> Decimal {
    if amount.fract().is_zero() {
        amount + AMOUNT_NUDGE
    } else {
        amount
    }
}

/// huobi client.
pub struct Huobi {
    http: HttpTransport,
    key: String,
    secret: String,
    deposit_address: Option<String>,
    pairs: HuobiPairs,
    block_orders: bool,
}

impl Huobi {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> Huobi {
        Huobi {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            deposit_address: credentials.deposit_address.clone(),
            pairs: HuobiPairs,
            block_orders,
        }
    }

    /// Sign the sorted parameters with the secret appended, MD5 lowercase
    /// hex.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut signed: Vec<(&str, String)> = params.to_vec();
        signed.push(("secret_key", self.secret.clone()));
        signed.sort_by(|a, b| a.0.cmp(b.0));
        md5_hex(build_query_string(&signed).as_bytes())
    }

    async fn market(&self, kind: &str, pair: &CanonicalPair) -> VenueResult<Value> {
        let token = coin_token(pair.base())
            .filter(|_| pair.quote() == Currency::Cny)
            .ok_or_else(|| self.pairs.unsupported_pair(pair))?;
        let url = format!("{}/{}_{}_json.js", MARKET_URL, kind, token);
        self.http.get(VENUE, &url, &[]).await
    }

    async fn private(&self, method: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let created = Utc::now().timestamp().to_string();
        let mut form: Vec<(&str, String)> = vec![
            ("method", method.to_string()),
            ("access_key", self.key.clone()),
            ("created", created),
        ];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let signature = self.sign(&form);
        form.push(("sign", signature));

        let body = build_query_string(&form);
        let value = self.http.post_form(VENUE, TRADE_URL, body, &[]).await?;
        fail_on_error(value)
    }

    /// Read-only call with bounded retries on the venue's rate-limit
    /// response. Writes are never retried this way.
    async fn private_read(&self, method: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        with_poll_retry(
            POLL_RETRY_ATTEMPTS,
            POLL_RETRY_DELAY,
            |e| e.message == "Too many requests",
            || self.private(method, params),
        )
        .await
    }
}

#[async_trait]
impl Exchange for Huobi {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let response = self.market("ticker", pair).await?;
        ticker_from(&response, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let book = self.market("depth", pair).await?;
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
        let info = self.private_read("get_account_info", &[]).await?;
        let (available, frozen) = balances_from(&info);
        let total = available.clone() + frozen;
        Ok(match kind {
            BalanceKind::Total => BalanceReport::Total(total),
            BalanceKind::Available => BalanceReport::Available(available),
            BalanceKind::Both => BalanceReport::Both { total, available },
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let coin = coin_type(pair.base())
            .filter(|_| pair.quote() == Currency::Cny)
            .ok_or_else(|| self.pairs.unsupported_pair(pair))?;
        let raw = self
            .private_read("get_orders", &[("coin_type", coin.to_string())])
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
        let coin = coin_type(pair.base())
            .filter(|_| pair.quote() == Currency::Cny)
            .ok_or_else(|| self.pairs.unsupported_pair(pair))?;

        let price = nudge_price(price.round_dp(PRICE_SCALE), side);
        let amount = nudge_amount(amount.round_dp(AMOUNT_SCALE));

        let method = match side {
            Side::Bid => "buy",
            Side::Ask => "sell",
        };
        let params = [
            ("coin_type", coin.to_string()),
            ("price", price.to_string()),
            ("amount", amount.to_string()),
        ];
        let data = self.private(method, &params).await?;
        if data.get("result").and_then(Value::as_str) == Some("success") {
            if let Some(order_id) = data.get("id").map(as_text) {
                return Ok(order_id);
            }
        }
        Err(malformed("unable to create order, response was", &data))
    }

    async fn cancel_order(&self, order_id: &str, pair: &CanonicalPair) -> VenueResult<bool> {
        let coin = coin_type(pair.base())
            .filter(|_| pair.quote() == Currency::Cny)
            .ok_or_else(|| self.pairs.unsupported_pair(pair))?;
        let params = [
            ("coin_type", coin.to_string()),
            ("id", order_id.to_string()),
        ];
        let response = self.private("cancel_order", &params).await?;
        Ok(response.get("result").and_then(Value::as_str) == Some("success"))
    }

    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String> {
        // no lookup endpoint; the address is static configuration
        if currency != Currency::Btc {
            return Err(VenueError::new(
                VENUE,
                format!("no deposit address for {}", currency),
            ));
        }
        self.deposit_address
            .clone()
            .ok_or_else(|| VenueError::new(VENUE, "no deposit address configured"))
    }

    async fn get_trade_history(&self, _pair: &CanonicalPair) -> VenueResult<Value> {
        // the venue does not expose a trade history endpoint
        Ok(json!([]))
    }
}
