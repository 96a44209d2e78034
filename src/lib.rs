//! Uniform clients for cryptocurrency exchange venues.
//!
//! Every venue speaks a different wire protocol, authentication scheme,
//! symbol notation, and error vocabulary. This crate hides all of that
//! behind one [`Exchange`] trait: callers pick a venue by [`VenueId`],
//! build a client from an [`ExchangeConfig`], and work entirely in the
//! shared value model: [`CanonicalPair`] symbols, currency-tagged
//! [`Money`] amounts, and multi-currency [`MultiMoney`] balances.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use exchange_connect::{
//!     venues, BalanceKind, CanonicalPair, Exchange, ExchangeConfig, MemoryNonceStore, VenueId,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExchangeConfig::from_toml_str(&std::fs::read_to_string("exchanges.toml")?)?;
//! let nonces = Arc::new(MemoryNonceStore::new());
//!
//! let kraken = venues::connect(VenueId::Kraken, &config, nonces)?;
//! let pair: CanonicalPair = "BTC_EUR".parse()?;
//!
//! let ticker = kraken.get_ticker(&pair).await?;
//! let balances = kraken.get_balance(BalanceKind::Both).await?;
//! println!("last {} / balances {:?}", ticker.last, balances);
//! # Ok(())
//! # }
//! ```
//!
//! Failures of any kind surface as [`VenueError`] carrying the venue id
//! and the venue's own message; see the [`venue::error`] module for the
//! classification heuristic.

pub mod config;
pub mod money;
pub mod venue;
pub mod venues;

pub use config::{ConfigError, ExchangeConfig, VenueCredentials};
pub use money::{Currency, Money, MultiMoney};
pub use venue::{
    BalanceKind, BalanceReport, CanonicalPair, ErrorHint, Exchange, MemoryNonceStore, NonceStore,
    OpenOrder, OrderBook, OrderbookItem, PairFormatter, Side, Ticker, VenueError, VenueId,
    VenueResult, ORDER_BLOCKED,
};
