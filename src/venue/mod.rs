//! Venue-agnostic core: the adapter contract, shared value types, pair
//! normalization, nonce sequencing, signing primitives, and the bounded
//! retry policy.

pub mod error;
pub mod http;
pub mod nonce;
pub mod retry;
pub mod symbology;
pub mod traits;
pub mod types;

pub use error::{ErrorHint, VenueError, VenueResult};
pub use nonce::{MemoryNonceStore, NonceStore};
pub use symbology::{CanonicalPair, PairFormatter};
pub use traits::{Exchange, ORDER_BLOCKED};
pub use types::{
    BalanceKind, BalanceReport, OpenOrder, OrderBook, OrderbookItem, Side, Ticker, VenueId,
};
