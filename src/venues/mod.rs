//! The venue adapters, one module per exchange, plus the constructor that
//! dispatches on [`VenueId`].

mod bitfinex;
mod bitstamp;
mod btce;
mod exmo;
mod huobi;
mod kraken;
mod lakebtc;
mod okcoin;
mod poloniex;

pub use bitfinex::{Bitfinex, BitfinexPairs};
pub use bitstamp::{Bitstamp, BitstampPairs};
pub use btce::{Btce, BtcePairs};
pub use exmo::{Exmo, ExmoPairs};
pub use huobi::{Huobi, HuobiPairs};
pub use kraken::{Kraken, KrakenPairs, KrakenSigner};
pub use lakebtc::{Lakebtc, LakebtcPairs};
pub use okcoin::{Okcoin, OkcoinPairs};
pub use poloniex::{Poloniex, PoloniexPairs};

use std::sync::Arc;

use crate::config::ExchangeConfig;
use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::HttpTransport;
use crate::venue::nonce::NonceStore;
use crate::venue::traits::Exchange;
use crate::venue::types::VenueId;

/// Build a client for one venue from configuration.
///
/// Dispatch is static: the id selects a concrete adapter type, and the
/// returned client owns its transport. The nonce store is shared across
/// venues that need a durable counter (currently btce); venues with
/// clock-derived nonces ignore it.
pub fn connect(
    venue: VenueId,
    config: &ExchangeConfig,
    nonces: Arc<dyn NonceStore>,
) -> VenueResult<Box<dyn Exchange>> {
    let credentials = config
        .credentials(venue)
        .map_err(|e| VenueError::new(venue, e.to_string()))?;
    let http = HttpTransport::new(config.timeout())
        .map_err(|e| VenueError::new(venue, format!("failed to build HTTP client: {}", e)))?;
    let block = config.block_orders;

    let exchange: Box<dyn Exchange> = match venue {
        VenueId::Kraken => Box::new(Kraken::new(credentials, http, block)?),
        VenueId::Bitstamp => Box::new(Bitstamp::new(credentials, http, block)?),
        VenueId::Bitfinex => Box::new(Bitfinex::new(credentials, http, block)?),
        VenueId::Btce => Box::new(Btce::new(credentials, http, nonces, block)),
        VenueId::Exmo => Box::new(Exmo::new(credentials, http, block)),
        VenueId::Huobi => Box::new(Huobi::new(credentials, http, block)),
        VenueId::Okcoin => Box::new(Okcoin::new(credentials, http, block)),
        VenueId::Lakebtc => Box::new(Lakebtc::new(credentials, http, block)),
        VenueId::Poloniex => Box::new(Poloniex::new(credentials, http, block)),
    };
    Ok(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VenueCredentials;
    use crate::venue::nonce::MemoryNonceStore;

    fn config_with(venue: &str, credentials: VenueCredentials) -> ExchangeConfig {
        let mut config = ExchangeConfig::default();
        config
            .venues
            .insert(venue.parse().unwrap(), credentials);
        config
    }

    #[test]
    fn test_connect_unconfigured_venue_fails() {
        let nonces = Arc::new(MemoryNonceStore::new());
        let err = connect(VenueId::Exmo, &ExchangeConfig::default(), nonces).unwrap_err();
        assert_eq!(err.venue, VenueId::Exmo);
        assert!(err.message.contains("no credentials"));
    }

    #[test]
    fn test_connect_builds_each_configured_venue() {
        let nonces: Arc<MemoryNonceStore> = Arc::new(MemoryNonceStore::new());
        let credentials = VenueCredentials {
            key: "key".to_string(),
            // valid base64 so the kraken signer accepts it
            secret: "c2VjcmV0".to_string(),
            client_id: Some("42".to_string()),
            deposit_address: Some("1abc".to_string()),
        };
        for venue in VenueId::ALL {
            let config = config_with(venue.as_str(), credentials.clone());
            let exchange = connect(venue, &config, nonces.clone()).unwrap();
            assert_eq!(exchange.venue(), venue);
        }
    }
}
