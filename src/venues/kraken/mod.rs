//! kraken venue adapter.
//!
//! Native symbols use the prefixed scheme (`XXBTZUSD`): an `X` marks a
//! crypto asset, a `Z` marks fiat, and BTC is spelled `XBT`. Private
//! responses arrive wrapped in `{"error": [...], "result": {...}}`.
//! kraken reports total balances only, so available funds are derived by
//! subtracting what the open orders tie up.

mod signer;

pub use signer::KrakenSigner;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::VenueCredentials;
use crate::money::{Currency, Money, MultiMoney};
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{build_query_string, HttpTransport};
use crate::venue::nonce::millisecond_nonce;
use crate::venue::retry::{with_nonce_retry, NONCE_RETRY_ATTEMPTS};
use crate::venue::symbology::{CanonicalPair, PairFormatter};
use crate::venue::traits::{Exchange, ORDER_BLOCKED};
use crate::venue::types::{
    as_decimal, BalanceKind, BalanceReport, OpenOrder, OrderBook, Side, Ticker, VenueId,
};

const VENUE: VenueId = VenueId::Kraken;
const BASE_URL: &str = "https://api.kraken.com";

/// Marker kraken puts in its rejection when a nonce is not strictly
/// increasing.
const NONCE_REJECTED: &str = "Invalid nonce";

/// Pair mapping for kraken's prefixed symbols.
pub struct KrakenPairs;

fn alias_to_kraken(base: Currency) -> &'static str {
    match base {
        Currency::Btc => "XBT",
        Currency::Doge => "XDG",
        other => other.code(),
    }
}

impl PairFormatter for KrakenPairs {
    fn venue(&self) -> VenueId {
        VENUE
    }

    fn to_venue(&self, pair: &CanonicalPair) -> VenueResult<String> {
        let base = alias_to_kraken(pair.base());
        // the X/Z prefix scheme only covers three-letter crypto codes
        // quoted in fiat
        if base.len() != 3 || pair.base().is_fiat() || !pair.quote().is_fiat() {
            return Err(self.unsupported_pair(pair));
        }
        Ok(format!("X{}Z{}", base, pair.quote().code()))
    }

    fn to_canonical(&self, native: &str) -> VenueResult<CanonicalPair> {
        let symbol = native.trim().to_uppercase();
        let bytes = symbol.as_bytes();
        if bytes.len() != 8 || bytes[0] != b'X' || bytes[4] != b'Z' {
            return Err(self.bad_native_symbol(native));
        }
        let base = Currency::from_code(&symbol[1..4])
            .filter(|c| !c.is_fiat())
            .ok_or_else(|| self.bad_native_symbol(native))?;
        let quote = Currency::from_code(&symbol[5..8])
            .filter(Currency::is_fiat)
            .ok_or_else(|| self.bad_native_symbol(native))?;
        CanonicalPair::new(base, quote).map_err(|e| VenueError::new(VENUE, e))
    }
}

/// Decode a kraken asset code (`XXBT`, `ZUSD`, `XBT.F` variants excluded)
/// into a known currency. Unknown assets yield `None` and are skipped.
fn asset_currency(code: &str) -> Option<Currency> {
    let code = code.trim().to_uppercase();
    let stripped = if code.len() == 4 && (code.starts_with('X') || code.starts_with('Z')) {
        &code[1..]
    } else {
        code.as_str()
    };
    Currency::from_code(stripped)
}

/// Currencies of an order's `descr.pair`, which kraken reports in the
/// short form (`XBTUSD`) rather than the prefixed one.
fn short_pair_currencies(pair: &str) -> Option<(Currency, Currency)> {
    let symbol = pair.trim().to_uppercase();
    if symbol.len() == 8 && symbol.starts_with('X') && symbol.as_bytes()[4] == b'Z' {
        let base = Currency::from_code(&symbol[1..4])?;
        let quote = Currency::from_code(&symbol[5..8])?;
        return Some((base, quote));
    }
    if symbol.len() < 6 {
        return None;
    }
    let split = symbol.len() - 3;
    let base = Currency::from_code(&symbol[..split])?;
    let quote = Currency::from_code(&symbol[split..])?;
    Some((base, quote))
}

/// One open order's decoded fields.
struct RawOrder {
    base: Currency,
    quote: Currency,
    side: Side,
    price: Decimal,
    remaining: Decimal,
    order_id: String,
}

/// Decode the `result` of an `OpenOrders` call. A missing or empty `open`
/// map means no orders, never an error.
fn open_orders_from(result: &Value) -> VenueResult<Vec<RawOrder>> {
    let Some(open) = result.get("open").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };

    let mut orders = Vec::new();
    for (order_id, order) in open {
        let descr = order
            .get("descr")
            .ok_or_else(|| malformed("order without descr", order))?;
        let pair = descr.get("pair").and_then(Value::as_str).unwrap_or_default();
        let Some((base, quote)) = short_pair_currencies(pair) else {
            // a pair outside the known currency set is not ours to report
            continue;
        };
        let side = descr
            .get("type")
            .and_then(Value::as_str)
            .and_then(Side::from_buy_sell)
            .ok_or_else(|| malformed("order without side", order))?;
        let price = descr
            .get("price")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without price", order))?;
        let volume = order
            .get("vol")
            .and_then(as_decimal)
            .ok_or_else(|| malformed("order without volume", order))?;
        let executed = order.get("vol_exec").and_then(as_decimal).unwrap_or_default();

        orders.push(RawOrder {
            base,
            quote,
            side,
            price,
            remaining: volume - executed,
            order_id: order_id.clone(),
        });
    }
    Ok(orders)
}

/// Funds tied up by resting orders: quote notional for bids, base amount
/// for asks.
fn tied_up_from(orders: &[RawOrder]) -> MultiMoney {
    let mut tied = MultiMoney::new();
    for order in orders {
        match order.side {
            Side::Bid => tied += Money::new(order.price * order.remaining, order.quote),
            Side::Ask => tied += Money::new(order.remaining, order.base),
        }
    }
    tied
}

fn balance_from(result: &Value) -> MultiMoney {
    let mut total = MultiMoney::new();
    if let Some(assets) = result.as_object() {
        for (asset, amount) in assets {
            let (Some(currency), Some(amount)) = (asset_currency(asset), as_decimal(amount))
            else {
                continue;
            };
            total += Money::new(amount, currency);
        }
    }
    total
}

fn ticker_from(tick: &Value, pair: &CanonicalPair) -> VenueResult<Ticker> {
    let first = |key: &str, idx: usize| -> VenueResult<Decimal> {
        tick.get(key)
            .and_then(|v| v.get(idx))
            .and_then(as_decimal)
            .ok_or_else(|| malformed("ticker missing field", tick))
    };
    Ok(Ticker::from_parts(
        first("b", 0)?,
        first("a", 0)?,
        first("h", 1)?,
        first("l", 1)?,
        first("c", 0)?,
        first("v", 1)?,
        pair.quote(),
        pair.base(),
        Utc::now(),
    ))
}

fn malformed(what: &str, value: &Value) -> VenueError {
    VenueError::new(VENUE, format!("{}: {}", what, value))
}

/// kraken client.
pub struct Kraken {
    http: HttpTransport,
    signer: KrakenSigner,
    pairs: KrakenPairs,
    block_orders: bool,
}

impl Kraken {
    pub fn new(
        credentials: &VenueCredentials,
        http: HttpTransport,
        block_orders: bool,
    ) -> VenueResult<Kraken> {
        Ok(Kraken {
            http,
            signer: KrakenSigner::new(credentials.key.clone(), &credentials.secret)?,
            pairs: KrakenPairs,
            block_orders,
        })
    }

    async fn public(&self, method: &str, params: &[(&str, String)]) -> VenueResult<Value> {
        let url = format!("{}/0/public/{}", BASE_URL, method);
        let response = self.http.get(VENUE, &url, params).await?;
        unwrap_result(response)
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
        let path = format!("/0/private/{}", method);
        let nonce = millisecond_nonce();

        let mut form: Vec<(&str, String)> = vec![("nonce", nonce.to_string())];
        form.extend(params.iter().map(|(k, v)| (*k, v.clone())));
        let post_data = build_query_string(&form);

        let signature = self.signer.sign(&path, &post_data, nonce);
        let headers = [
            ("API-Key", self.signer.api_key().to_string()),
            ("API-Sign", signature),
        ];

        let url = format!("{}{}", BASE_URL, path);
        let response = self.http.post_form(VENUE, &url, post_data, &headers).await?;
        unwrap_result(response)
    }

    async fn all_open_orders(&self) -> VenueResult<Vec<RawOrder>> {
        let result = self
            .private("OpenOrders", &[("trades", "true".to_string())])
            .await?;
        open_orders_from(&result)
    }
}

/// Unwrap kraken's `{"error": [...], "result": ...}` envelope, surfacing
/// the venue's first error string verbatim.
fn unwrap_result(response: Value) -> VenueResult<Value> {
    if let Some(first) = response
        .get("error")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(Value::as_str)
    {
        return Err(VenueError::new(VENUE, first));
    }
    response
        .get("result")
        .cloned()
        .ok_or_else(|| malformed("no result in response", &response))
}

#[async_trait]
impl Exchange for Kraken {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker> {
        let native = self.pairs.to_venue(pair)?;
        let result = self.public("Ticker", &[("pair", native.clone())]).await?;
        let tick = result
            .get(&native)
            .ok_or_else(|| malformed("ticker missing pair", &result))?;
        ticker_from(tick, pair)
    }

    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook> {
        let native = self.pairs.to_venue(pair)?;
        let result = self.public("Depth", &[("pair", native.clone())]).await?;
        let book = result
            .get(&native)
            .ok_or_else(|| malformed("depth missing pair", &result))?;
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
        let total = balance_from(&self.private("Balance", &[]).await?);
        if let BalanceKind::Total = kind {
            return Ok(BalanceReport::Total(total));
        }

        // kraken only reports totals; funds free to trade are what the
        // open orders have not claimed
        let tied = tied_up_from(&self.all_open_orders().await?);
        let available = total.clone() - tied;
        Ok(if let BalanceKind::Available = kind {
            BalanceReport::Available(available)
        } else {
            BalanceReport::Both { total, available }
        })
    }

    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>> {
        let orders = self.all_open_orders().await?;
        Ok(orders
            .into_iter()
            .filter(|o| o.base == pair.base() && o.quote == pair.quote())
            .map(|o| OpenOrder {
                price: Money::new(o.price, o.quote),
                amount: Money::new(o.remaining, o.base),
                side: o.side,
                venue: VENUE,
                order_id: o.order_id,
            })
            .collect())
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
            ("ordertype", "limit".to_string()),
            ("price", price.to_string()),
            ("volume", amount.to_string()),
        ];
        let result = self.private("AddOrder", &params).await?;
        result
            .get("txid")
            .and_then(Value::as_array)
            .and_then(|txids| txids.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| malformed("order accepted without txid", &result))
    }

    async fn cancel_order(&self, order_id: &str, _pair: &CanonicalPair) -> VenueResult<bool> {
        let result = self
            .private("CancelOrder", &[("txid", order_id.to_string())])
            .await?;
        Ok(result
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            > 0)
    }

    async fn get_deposit_address(&self, _currency: Currency) -> VenueResult<String> {
        Err(VenueError::new(
            VENUE,
            "deposit address lookup not supported",
        ))
    }

    async fn get_trade_history(&self, _pair: &CanonicalPair) -> VenueResult<Value> {
        self.private("TradesHistory", &[("trades", "true".to_string())])
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
        let pairs = KrakenPairs;
        for canonical in ["BTC_USD", "BTC_EUR", "LTC_USD", "DOGE_EUR"] {
            let p = pair(canonical);
            let native = pairs.to_venue(&p).unwrap();
            assert_eq!(pairs.to_canonical(&native).unwrap(), p);
            assert_eq!(pairs.to_venue(&pairs.to_canonical(&native).unwrap()).unwrap(), native);
        }
    }

    #[test]
    fn test_pair_prefix_scheme() {
        let pairs = KrakenPairs;
        assert_eq!(pairs.to_venue(&pair("BTC_USD")).unwrap(), "XXBTZUSD");
        assert_eq!(pairs.to_venue(&pair("BTC_EUR")).unwrap(), "XXBTZEUR");
        assert_eq!(pairs.to_canonical("XXBTZUSD").unwrap(), pair("BTC_USD"));
        assert_eq!(pairs.to_canonical("XXDGZEUR").unwrap(), pair("DOGE_EUR"));
    }

    #[test]
    fn test_unsupported_pairs_rejected() {
        let pairs = KrakenPairs;
        // four-letter base has no X-prefix spelling
        assert!(pairs.to_venue(&pair("DASH_BTC")).is_err());
        // crypto quote is outside the Z-prefix scheme
        assert!(pairs.to_venue(&pair("LTC_BTC")).is_err());
        assert!(pairs.to_canonical("btcusd").is_err());
    }

    #[test]
    fn test_asset_codes() {
        assert_eq!(asset_currency("XXBT"), Some(Currency::Btc));
        assert_eq!(asset_currency("ZUSD"), Some(Currency::Usd));
        assert_eq!(asset_currency("ZEUR"), Some(Currency::Eur));
        assert_eq!(asset_currency("XLTC"), Some(Currency::Ltc));
        assert_eq!(asset_currency("USDT"), Some(Currency::Usd));
        assert_eq!(asset_currency("KFEE"), None);
    }

    #[test]
    fn test_unwrap_result_surfaces_venue_error_verbatim() {
        let err = unwrap_result(json!({"error": ["EOrder:Insufficient funds"]})).unwrap_err();
        assert_eq!(err.message, "EOrder:Insufficient funds");

        let ok = unwrap_result(json!({"error": [], "result": {"x": 1}})).unwrap();
        assert_eq!(ok, json!({"x": 1}));
    }

    #[test]
    fn test_ticker_parsing() {
        let tick = json!({
            "a": ["251.20", "1", "1.0"],
            "b": ["250.90", "2", "2.0"],
            "c": ["251.00", "0.1"],
            "v": ["123.4", "456.7"],
            "h": ["255.0", "260.0"],
            "l": ["240.0", "238.0"]
        });
        let ticker = ticker_from(&tick, &pair("BTC_EUR")).unwrap();
        assert_eq!(ticker.bid.amount(), dec!(250.90));
        assert_eq!(ticker.ask.amount(), dec!(251.20));
        assert_eq!(ticker.last.amount(), dec!(251.00));
        assert_eq!(ticker.high.amount(), dec!(260.0));
        assert_eq!(ticker.low.amount(), dec!(238.0));
        assert_eq!(ticker.volume.amount(), dec!(456.7));
        assert_eq!(ticker.bid.currency(), Currency::Eur);
        assert_eq!(ticker.volume.currency(), Currency::Btc);
    }

    fn open_orders_fixture() -> Value {
        json!({
            "open": {
                "OA1": {
                    "descr": {"pair": "XBTUSD", "type": "buy", "price": "400.0"},
                    "vol": "1.5",
                    "vol_exec": "0.5"
                },
                "OA2": {
                    "descr": {"pair": "XBTUSD", "type": "sell", "price": "900.0"},
                    "vol": "0.25",
                    "vol_exec": "0"
                }
            }
        })
    }

    #[test]
    fn test_open_orders_and_tied_up() {
        let orders = open_orders_from(&open_orders_fixture()).unwrap();
        assert_eq!(orders.len(), 2);

        let tied = tied_up_from(&orders);
        // bid: 400 * (1.5 - 0.5) USD; ask: 0.25 BTC
        assert_eq!(tied.get(Currency::Usd).amount(), dec!(400.0));
        assert_eq!(tied.get(Currency::Btc).amount(), dec!(0.25));
    }

    #[test]
    fn test_no_open_orders_is_empty_not_error() {
        assert!(open_orders_from(&json!({})).unwrap().is_empty());
        assert!(open_orders_from(&json!({"open": {}})).unwrap().is_empty());
    }

    #[test]
    fn test_balance_parsing_skips_unknown_assets() {
        let result = json!({
            "XXBT": "1.25",
            "ZUSD": "1000.0",
            "ZEUR": "50.5",
            "KFEE": "999"
        });
        let total = balance_from(&result);
        assert_eq!(total.get(Currency::Btc).amount(), dec!(1.25));
        assert_eq!(total.get(Currency::Usd).amount(), dec!(1000.0));
        assert_eq!(total.get(Currency::Eur).amount(), dec!(50.5));
        assert_eq!(total.len(), 3);
    }
}
