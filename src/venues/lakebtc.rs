//! lakebtc venue adapter.
//!
//! Private calls are JSON-RPC style: one POST endpoint, the method and
//! positional params in the body, and an HMAC-SHA1 signature over a
//! canonical `tonce=...&accesskey=...` message carried as HTTP Basic
//! credentials. The venue runs a CNY book; totals come from
//! `getAccountInfo` and available funds are derived from open orders.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{hmac_sha1_hex, HttpTransport};
use crate::venue::nonce::microsecond_nonce;
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, as_text, BalanceKind, BalanceReport, OpenOrder, OrderBook, Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Lakebtc;
const BASE_URL: &str = "https://www.lakebtc.com/api_v1";

/// Venue constraints for order placement.
const PRICE_SCALE: u32 = 2;
const AMOUNT_SCALE: u32 = 3;

/// One CNY-quoted book.
pub struct LakebtcPairs;

impl PairFormatter for LakebtcPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        if pair.base() == Currency::Btc && pair.quote() == Currency::Cny {
            Ok("btc_cny".to_string())
        } else {
            Err(self.unsupported_pair(pair))
        }
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        if native.trim().to_lowercase() == "btc_cny" {
            CanonicalPair::new(Currency::Btc, Currency::Cny)
                .map_err(|e| VenueError::new(VENUE, e))
        } else {
            Err(self.bad_native_symbol(native))
        }
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

fn ticker_from(response: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
    let tick = response
        .get(pair.quote().code())
        .ok_or_else(|| malformed("ticker missing currency", response))?;
    let field = |key: &str| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    Ok(Ticker::from_parts(
        field("bid")?,
        field("ask")?,
        field("high")?,
        field("low")?,
        field("last")?,
        field("volume")?,
        pair.quote(),
        pair.base(),
        Utc::now(),
    ))
}

fn total_from(account: &Value) -> VenueResult<MultiMoney> {
    let balance = account
        .get("balance")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("account info without balance", account))?;
    let mut total = MultiMoney::new();
    for (code, amount) in balance {
        let (Some(currency), Some(amount)) = (Currency::from_code(code), as_decimal(amount))
        else {
            continue;
        };
        total += Money::new(amount, currency);
    }
    Ok(total)
}

fn open_orders_from(raw: &Value) -> VenueResult<Vec<OpenOrder>> {
    let Some(list) = raw.as_array() else {
        return Err(malformed("expected order list", raw));
    };
    let mut orders = Vec::new();
    for order in list {
        let side = order
            .get("category")
            .and_then(Value::as_str)
            .and_then(Side::from_buy_sell)
            .ok_or_else(|| malformed("order without category", order))?;
        let price = order
            .get("ppc")
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
            price: Money::new(price, Currency::Cny),
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

/// lakebtc client.
pub struct Lakebtc {
    http: HttpTransport,
    key: String,
    secret: String,
    pairs: LakebtcPairs,
    block_orders: bool,
}

impl Lakebtc {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> Lakebtc {
        Lakebtc {
            http,
            key: credentials.key.clone(),
            secret: credentials.secret.clone(),
            pairs: LakebtcPairs,
            block_orders,
        }
    }

    /// The canonical message the venue recomputes server-side. Field order
    /// is fixed by the venue.
    fn signed_message(&self, tonce: u64, method: &str, params: &[String]) -> String {
        format!(
            "tonce={}&accesskey={}&requestmethod=post&id=1&method={}&params={}",
            tonce,
            self.key,
            method,
            params.join(",")
        )
    }

    async fn public(&self, path: &str) -> VenueResult<Value> {
        let url = format!("{}/{}", BASE_URL, path);
        let value = self.http.get(VENUE, &url, &[]).await?;
        fail_on_error(value)
    }

    async fn private(&self, method: &str, params: &[String]) -> VenueResult<Value> {
        let tonce = microsecond_nonce();
        let signature = hmac_sha1_hex(
            self.secret.as_bytes(),
            self.signed_message(tonce, method, params).as_bytes(),
        );
        let auth = BASE64.encode(format!("{}:{}", self.key, signature));

        let body = json!({
            "method": method,
            "params": params,
            "id": 1,
        })
        .to_string();
        let headers = [
            ("Authorization", format!("Basic {}", auth)),
            ("Json-Rpc-Tonce", tonce.to_string()),
        ];

        let value = self.http.post_json(VENUE, BASE_URL, body, &headers).await?;
        fail_on_error(value)
    }

    async fn open_orders(&self) -> VenueResult<Vec<OpenOrder>> {
        let raw = self.private("getOrders", &[]).await?;
        open_orders_from(&raw)
    }
}

#[async_trait]
impl Exchange for Lakebtc {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        self.pairs.to_venue(pair)?;
        let response = self.public("ticker").await?;
        ticker_from(&response, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        self.pairs.to_venue(pair)?;
        let book = self.public("bcorderbook_cny").await?;
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
        let total = total_from(&self.private("getAccountInfo", &[]).await?)?;
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
        let method = match side {
            Side::Bid => "buyOrder",
            Side::Ask => "sellOrder",
        };
        let params = [
            price.round_dp(PRICE_SCALE).to_string(),
            amount.round_dp(AMOUNT_SCALE).to_string(),
            pair.quote().code().to_string(),
        ];
        let data = self.private(method, &params).await?;
        data.get("id")
            .map(as_text)
            .ok_or_else(|| malformed("order accepted without id", &data))
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let response = self
            .private("cancelOrder", &[order_id.to_string()])
            .await?;
        Ok(response.get("result").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String> {
        if currency != Currency::Btc {
            return Err(VenueError::new(
                VENUE,
                format!("no deposit address for {}", currency),
            ));
        }
        let account = self.private("getAccountInfo", &[]).await?;
        account
            .get("profile")
            // the field name is misspelled in the venue response
            .and_then(|profile| profile.get("btc_deposit_addres"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("no deposit address in account info", &account))
    }

    async fn get_trade_history(&self, _pair: &CanonicalPair) -> VenueResult<Value> {
        // default window: trades from the last 24 hours
        let since = Utc::now().timestamp() - 86_400;
        self.private("getTrades", &[since.to_string()]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_cny() -> CanonicalPair {
        "BTC_CNY".parse().unwrap()
    }

    #[test]
    fn test_single_market_mapping() {
        let pairs = LakebtcPairs;
        assert_eq!(pairs.to_venue(&btc_cny()).unwrap(), "btc_cny");
        assert_eq!(pairs.to_canonical("btc_cny").unwrap(), btc_cny());
        assert!(pairs.to_venue(&"BTC_USD".parse().unwrap()).is_err());
    }

    #[test]
    fn test_signed_message_layout() {
        let lakebtc = Lakebtc::new(
            &VenueCredentials {
                key: "ak".to_string(),
                secret: "sk".to_string(),
                ..VenueCredentials::default()
            },
            HttpTransport::new(std::time::Duration::from_secs(1)).unwrap(),
            false,
        );
        let message = lakebtc.signed_message(
            1_414_170_000_000_000,
            "buyOrder",
            &["1500.00".to_string(), "0.250".to_string(), "CNY".to_string()],
        );
        assert_eq!(
            message,
            "tonce=1414170000000000&accesskey=ak&requestmethod=post&id=1&method=buyOrder&params=1500.00,0.250,CNY"
        );
    }

    #[test]
    fn test_ticker_reads_cny_block() {
        let response = serde_json::json!({
            "CNY": {"bid": "1500.0", "ask": "1502.0", "high": "1520.0",
                     "low": "1480.0", "last": "1501.0", "volume": "812.5"},
            "USD": {"bid": "244.0", "ask": "245.0", "high": "250.0",
                     "low": "240.0", "last": "244.5", "volume": "120.0"}
        });
        let ticker = ticker_from(&response, &btc_cny()).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(1500.0));
        assert_eq!(ticker.bid.currency(), Currency::Cny);
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    #[test]
    fn test_balance_identity_against_open_orders() {
        let total = total_from(&serde_json::json!({
            "balance": {"BTC": "3.0", "CNY": "5000.0"},
            "profile": {"btc_deposit_addres": "1abc"}
        }))
        .unwrap();

        let orders = open_orders_from(&serde_json::json!([
            {"id": 1, "category": "buy", "ppc": "1000.0", "amount": "1.0"},
            {"id": 2, "category": "sell", "ppc": "2000.0", "amount": "0.5"}
        ]))
        .unwrap();

        let available = total.clone() - tied_up(&orders);
        // the bid ties 1000 CNY, the ask ties 0.5 BTC
        assert_eq!(available.get(Currency::Cny).amount(), dec!(4000.0));
        assert_eq!(available.get(Currency::Btc).amount(), dec!(2.5));

        let claimed = total - available;
        assert_eq!(claimed.get(Currency::Cny).amount(), dec!(1000.0));
        assert_eq!(claimed.get(Currency::Btc).amount(), dec!(0.5));
    }

    #[test]
    fn test_error_field_is_verbatim() {
        let err = fail_on_error(serde_json::json!({"error": "invalid signature"})).unwrap_err();
        assert_eq!(err.message, "invalid signature");
    }
}
