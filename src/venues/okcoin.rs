//! okcoin venue adapter.
//!
//! Native symbols are lowercase underscore pairs. Signed calls carry the
//! partner id and an MD5 signature, uppercase hex, over the sorted
//! parameters with `&secret_key=...` appended. That is the venue's
//! scheme, and there is no nonce at all. Errors come back as numeric
//! `error_code` fields. The deposit address is static configuration.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, md5_hex, HttpTransport};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, timestamp_from_epoch, BalanceKind, BalanceReport, OpenOrder, OrderBook,
    Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Okcoin;
const BASE_URL: &str = "https://www.okcoin.com/api/v1";

/// Lowercase underscore symbols, USD quoted.
pub struct OkcoinPairs;

impl PairFormatter for OkcoinPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        if pair.quote() != Currency::Usd || pair.base().is_fiat() {
            return Err(self.unsupported_pair(pair));
        }
        Ok(format!("{}_usd", pair.base().code().to_lowercase()))
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let symbol = native.trim().to_uppercase();
        let (base, quote) = symbol
            .split_once('_')
            .ok_or_else(|| self.bad_native_symbol(native))?;
        if quote != "USD" {
            return Err(self.bad_native_symbol(native));
        }
        let base = Currency::from_code(base)
            .filter(|c| !c.is_fiat())
            .ok_or_else(|| self.bad_native_symbol(native))?;
        CanonicalPair::new(base, Currency::Usd).map_err(|e| VenueError::new(VENUE, e))
    }
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

/// okcoin signals failure with a numeric `error_code`.
fn fail_on_error(value: Value) -> VenueResult<Value> {
    if let Some(code) = value.get("error_code") {
        return Err(VenueError::new(VENUE, format!("error code {}", as_text(code))));
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
    let timestamp = response
        .get("date")
        .and_then(timestamp_from_epoch)
        .unwrap_or_else(Utc::now);
    Ok(Ticker::from_parts(
        field("buy")?,
        field("sell")?,
        field("high")?,
        field("low")?,
        field("last")?,
        field("vol")?,
        pair.quote(),
        pair.base(),
        timestamp,
    ))
}

fn balances_from(info: &Value) -> VenueResult<(MultiMoney, MultiMoney)> {
    let funds = info
        .get("info")
        .and_then(|i| i.get("funds"))
        .ok_or_else(|| malformed("userinfo without funds", info))?;
    let side = |key: &str| -> MultiMoney {
        let mut out = MultiMoney::new();
        if let Some(entries) = funds.get(key).and_then(Value::as_object) {
            for (code, amount) in entries {
                let (Some(currency), Some(amount)) =
                    (Currency::from_code(code), as_decimal(amount))
                else {
                    continue;
                };
                out += Money::new(amount, currency);
            }
        }
        out
    };
    Ok((side("free"), side("freezed")))
}

fn open_orders_from(response: &Value, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
    if response.get("result").and_then(Value::as_bool) != Some(true) {
        return Err(malformed("unable to get open orders, response was", response));
    }
    let Some(list) = response.get("orders").and_then(Value::as_array) else {
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
        let amount = order
            .get("amount")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without amount", order))?;
        let dealt = order
            .get("deal_amount")
            .and_then(as_decimal)
            .unwrap_or_default();
        let order_id = order
            .get("order_id")
            .map(as_text)
            .ok_or_else(|| malformed("order without id", order))?;
        orders.push(OpenOrder {
            price: Money::new(price, pair.quote()),
            amount: Money::new(amount - dealt, pair.base()),
            side,
            venue: VENUE,
            order_id,
        });
    }
    Ok(orders)
}

/// okcoin client.
pub struct Okcoin {
    http: HttpTransport,
    partner: String,
    secret: String,
    deposit_address: Option<String>,
    pairs: OkcoinPairs,
    block_orders: bool,
}

impl Okcoin {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> Okcoin {
        Okcoin {
            http,
            partner: credentials.key.clone(),
            secret: credentials.secret.clone(),
            deposit_address: credentials.deposit_address.clone(),
            pairs: OkcoinPairs,
            block_orders,
        }
    }

    /// MD5 over the sorted parameters with the secret appended, uppercase
    /// hex.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<(&str, String)> = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let message = format!("{}&secret_key={}", build_query_string(&sorted), self.secret);
        md5_hex(message.as_bytes()).to_uppercase()
    }

    async fn public(&self, endpoint: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let url = format!("{}/{}", BASE_URL, endpoint);
        let value = self.http.get(VENUE, &url, params).await?;
        fail_on_error(value)
    }

    async fn private(&self, endpoint: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let mut form: Vec<(&str, String)> = vec![("partner", self.partner.clone())];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));

        let signature = self.sign(&form);
        form.push(("sign", signature));

        let url = format!("{}/{}", BASE_URL, endpoint);
        let body = build_query_string(&form);
        let value = self.http.post_form(VENUE, &url, body, &[]).await?;
        fail_on_error(value)
    }
}

#[async_trait]
impl Exchange for Okcoin {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let native = self.pairs.to_venue(pair)?;
        let response = self.public("ticker.do", &[("symbol", native)]).await?;
        ticker_from(&response, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let native = self.pairs.to_venue(pair)?;
        let book = self.public("depth.do", &[("symbol", native)]).await?;
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
        let info = self.private("userinfo.do", &[]).await?;
        let (free, frozen) = balances_from(&info)?;
        let total = free.clone() + frozen;
        Ok(match kind {
            BalanceKind::Total => BalanceReport::Total(total),
            BalanceKind::Available => BalanceReport::Available(free),
            BalanceKind::Both => BalanceReport::Both {
                total,
                available: free,
            },
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let native = self.pairs.to_venue(pair)?;
        let response = self
            .private(
                "order_info.do",
                &[
                    ("order_id", "-1".to_string()),
                    ("symbol", native),
                ],
            )
            .await?;
        open_orders_from(&response, pair)
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
            ("symbol", native),
            ("type", side.to_string()),
            ("price", price.to_string()),
            ("amount", amount.to_string()),
        ];
        let data = self.private("trade.do", &params).await?;
        if data.get("result").and_then(Value::as_bool) == Some(true) {
            if let Some(order_id) = data.get("order_id").map(as_text) {
                return Ok(order_id);
            }
        }
        Err(malformed("unable to create order, response was", &data))
    }

    async fn cancel_order(&self, order_id: &str, pair: &CanonicalPair) -> VenueResult<bool> {
        let native = self.pairs.to_venue(pair)?;
        let params = [
            ("order_id", order_id.to_string()),
            ("symbol", native),
        ];
        let response = self.private("cancel_order.do", &params).await?;
        Ok(response.get("order_id").map(as_text).as_deref() == Some(order_id))
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

    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value> {
        let native = self.pairs.to_venue(pair)?;
        self.private(
            "order_history.do",
            &[
                ("status", "1".to_string()),
                ("current_page", "1".to_string()),
                ("page_length", "200".to_string()),
                ("symbol", native),
            ],
        )
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
    fn test_pair_round_trip() {
        let pairs = OkcoinPairs;
        for canonical in ["BTC_USD", "LTC_USD"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
        }
        assert_eq!(pairs.to_venue(&pair("BTC_USD")).unwrap(), "btc_usd");
        assert!(pairs.to_venue(&pair("BTC_CNY")).is_err());
        assert!(pairs.to_canonical("btc_cny").is_err());
    }

    #[test]
    fn test_signature_appends_secret_after_sorting() {
        let okcoin = Okcoin::new(
            &VenueCredentials {
                key: "partner1".to_string(),
                secret: "topsecret".to_string(),
                ..VenueCredentials::default()
            },
            HttpTransport::new(std::time::Duration::from_secs(1)).unwrap(),
            false,
        );
        let params = [
            ("symbol", "btc_usd".to_string()),
            ("partner", "partner1".to_string()),
        ];
        let expected =
            md5_hex("partner=partner1&symbol=btc_usd&secret_key=topsecret".as_bytes())
                .to_uppercase();
        assert_eq!(okcoin.sign(&params), expected);
    }

    #[test]
    fn test_error_code_is_an_error() {
        let err = fail_on_error(json!({"error_code": 10002})).unwrap_err();
        assert_eq!(err.message, "error code 10002");
        assert!(fail_on_error(json!({"result": true})).is_ok());
    }

    #[test]
    fn test_ticker_parsing() {
        let response = json!({
            "date": "1414170000",
            "ticker": {"buy": "244.50", "sell": "244.80", "high": "248.0",
                       "low": "240.1", "last": "244.6", "vol": "18940.2"}
        });
        let ticker = ticker_from(&response, &pair("BTC_USD")).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(244.50));
        assert_eq!(ticker.ask.amount(), dec!(244.80));
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    #[test]
    fn test_balance_sides() {
        let info = json!({"info": {"funds": {
            "free": {"btc": "1.2", "usd": "700.0", "ltc": "0"},
            "freezed": {"btc": "0.3", "usd": "100.0", "ltc": "0"}
        }}});
        let (free, frozen) = balances_from(&info).unwrap();
        let total = free.clone() + frozen;
        assert_eq!(free.get(Currency::Usd).amount(), dec!(700.0));
        assert_eq!(total.get(Currency::Btc).amount(), dec!(1.5));
    }

    #[test]
    fn test_open_orders_subtract_dealt_amount() {
        let response = json!({"result": true, "orders": [
            {"order_id": 5001, "type": "sell", "price": "300.0",
             "amount": "2.0", "deal_amount": "0.75", "symbol": "btc_usd"}
        ]});
        let orders = open_orders_from(&response, &pair("BTC_USD")).unwrap();
        assert_eq!(orders[0].side, Side::Ask);
        assert_eq!(orders[0].amount, Money::new(dec!(1.25), Currency::Btc));
        assert_eq!(orders[0].order_id, "5001");
    }

    #[test]
    fn test_result_false_is_an_error() {
        let response = json!({"result": false});
        assert!(open_orders_from(&response, &pair("BTC_USD")).is_err());
    }
}
