//! The adapter contract every venue implements.
//!
//! Callers pick a venue by [`VenueId`], get a boxed [`Exchange`], and write
//! venue-agnostic code against it. Adapters translate symbols, sides, and
//! error vocabulary internally; everything crossing this trait is in the
//! shared value model.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::money::Currency;

use super::error::{VenueError, VenueResult};
use super::symbology::CanonicalPair;
use super::types::{
    as_decimal, BalanceKind, BalanceReport, OpenOrder, OrderBook, OrderbookItem, Side, Ticker,
    VenueId,
};

/// Sentinel returned by `create_order` when the global block-orders switch
/// is set: the order was never sent to the venue.
pub const ORDER_BLOCKED: &str = "order blocked";

/// Uniform client interface over one exchange venue.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn venue(&self) -> VenueId;

    /// Current top-of-market snapshot for a pair.
    async fn get_ticker(&self, pair: &CanonicalPair) -> VenueResult<Ticker>;

    /// The venue's order book, entries in venue-native shape and ordering
    /// (best price first is expected but not verified here). Normalize
    /// entries per item with [`Exchange::format_book_item`].
    async fn get_order_book(&self, pair: &CanonicalPair) -> VenueResult<OrderBook>;

    /// Decode one raw book entry. The default expects the common
    /// `[price, size]` array shape; venues with object-shaped entries
    /// override it.
    fn format_book_item(&self, entry: &Value) -> VenueResult<OrderbookItem> {
        let items = entry
            .as_array()
            .filter(|items| items.len() >= 2)
            .ok_or_else(|| self.malformed_book_item(entry))?;
        let price = as_decimal(&items[0]).ok_or_else(|| self.malformed_book_item(entry))?;
        let amount = as_decimal(&items[1]).ok_or_else(|| self.malformed_book_item(entry))?;
        Ok(OrderbookItem { price, amount })
    }

    /// Balance figures for the account. Venues that cannot report both
    /// `Total` and `Available` directly compute the missing figure from the
    /// notional value of their open orders.
    async fn get_balance(&self, kind: BalanceKind) -> VenueResult<BalanceReport>;

    /// Open orders for a pair. A venue reporting "no orders" yields an
    /// empty vec, never an error.
    async fn get_open_orders(&self, pair: &CanonicalPair) -> VenueResult<Vec<OpenOrder>>;

    /// Place a limit order, returning the venue-assigned order id, or the
    /// [`ORDER_BLOCKED`] sentinel when order placement is globally blocked.
    async fn create_order(
        &self,
        amount: Decimal,
        price: Decimal,
        side: Side,
        pair: &CanonicalPair,
    ) -> VenueResult<String>;

    /// Cancel one order. `true` when the venue confirms the cancel or
    /// reports the order already gone; `false` only on explicit failure.
    async fn cancel_order(&self, order_id: &str, pair: &CanonicalPair) -> VenueResult<bool>;

    /// Cancel every open order for a pair. `true` only if each individual
    /// cancellation succeeded.
    async fn cancel_orders(&self, pair: &CanonicalPair) -> VenueResult<bool> {
        let orders = self.get_open_orders(pair).await?;
        let mut success = true;
        for order in orders {
            if !self.cancel_order(&order.order_id, pair).await? {
                success = false;
            }
        }
        Ok(success)
    }

    /// Deposit address for a currency. Venues without the capability fail
    /// with a [`VenueError`]; some serve a static configured address.
    async fn get_deposit_address(&self, currency: Currency) -> VenueResult<String>;

    /// The account's trade history, in the venue's native shape.
    async fn get_trade_history(&self, pair: &CanonicalPair) -> VenueResult<Value>;

    fn malformed_book_item(&self, entry: &Value) -> VenueError {
        VenueError::new(self.venue(), format!("malformed book entry: {}", entry))
    }
}

#[cfg(test)]
mod tests {
    // Compile-time check that the contract stays object-safe and shareable.
    fn _assert_send_sync<T: Send + Sync + ?Sized>() {}

    fn _check_trait_bounds() {
        _assert_send_sync::<Box<dyn super::Exchange>>();
    }
}
