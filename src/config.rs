//! Process-wide configuration.
//!
//! Designed to be deserialized from a TOML file once at startup and treated
//! as read-only thereafter. There is no ambient global: callers hand the
//! parsed [`ExchangeConfig`] to [`crate::venues::connect`], which makes the
//! block-orders switch and every credential an explicit input.
//!
//! ```toml
//! block_orders = false
//! request_timeout_ms = 10000
//!
//! [venues.kraken]
//! key = "..."
//! secret = "..."          # base64, as the venue issues it
//!
//! [venues.bitstamp]
//! key = "..."
//! secret = "..."
//! client_id = "123456"
//!
//! [venues.huobi]
//! key = "..."
//! secret = "..."
//! deposit_address = "1FfmbHfnpaZjKFvyi1okTjJJusN455paPH"
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::venue::types::VenueId;

/// Configuration failures, distinct from venue errors: nothing here ever
/// reached a venue.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no credentials configured for {0}")]
    MissingVenue(VenueId),

    #[error("failed to build HTTP client: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Credentials and per-venue settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VenueCredentials {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret: String,
    /// Customer/partner id, required by venues that sign it into the
    /// message (bitstamp) or send it alongside the key (okcoin).
    #[serde(default)]
    pub client_id: Option<String>,
    /// Static deposit address for venues without an address-lookup
    /// endpoint.
    #[serde(default)]
    pub deposit_address: Option<String>,
}

/// Read-only process configuration for all venue adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// When set, `create_order` returns a sentinel instead of submitting.
    #[serde(default)]
    pub block_orders: bool,
    /// HTTP request timeout applied to every venue call.
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub venues: HashMap<VenueId, VenueCredentials>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            block_orders: false,
            request_timeout_ms: default_timeout_ms(),
            venues: HashMap::new(),
        }
    }
}

impl ExchangeConfig {
    pub fn from_toml_str(raw: &str) -> Result<ExchangeConfig, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn credentials(&self, venue: VenueId) -> Result<&VenueCredentials, ConfigError> {
        self.venues
            .get(&venue)
            .ok_or(ConfigError::MissingVenue(venue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        block_orders = true

        [venues.kraken]
        key = "k1"
        secret = "czE="

        [venues.bitstamp]
        key = "k2"
        secret = "s2"
        client_id = "123456"

        [venues.okcoin]
        key = "partner-id"
        secret = "s3"
        deposit_address = "1FfmbHfnpaZjKFvyi1okTjJJusN455paPH"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = ExchangeConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.block_orders);
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.venues.len(), 3);

        let bitstamp = config.credentials(VenueId::Bitstamp).unwrap();
        assert_eq!(bitstamp.client_id.as_deref(), Some("123456"));

        let okcoin = config.credentials(VenueId::Okcoin).unwrap();
        assert!(okcoin.deposit_address.is_some());
    }

    #[test]
    fn test_missing_venue_is_an_error() {
        let config = ExchangeConfig::from_toml_str(SAMPLE).unwrap();
        assert!(matches!(
            config.credentials(VenueId::Poloniex),
            Err(ConfigError::MissingVenue(VenueId::Poloniex))
        ));
    }

    #[test]
    fn test_defaults() {
        let config = ExchangeConfig::default();
        assert!(!config.block_orders);
        assert_eq!(config.request_timeout_ms, 10_000);

        let parsed = ExchangeConfig::from_toml_str("").unwrap();
        assert_eq!(parsed.request_timeout_ms, 10_000);
    }
}
