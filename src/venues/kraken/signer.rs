//! Request signing for the kraken API.
//!
//! kraken's scheme has two steps:
//! 1. SHA256(nonce + POST body)
//! 2. HMAC-SHA512(uri path + digest) keyed with the base64-decoded secret
//!
//! and the result goes base64-encoded into the `API-Sign` header. The
//! secret is issued base64-encoded and must be decoded before keying.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::venue::error::{VenueError, VenueResult};
use crate::venue::http::{hmac_sha512_b64, sha256_digest};
use crate::venue::types::VenueId;

#[derive(Clone)]
pub struct KrakenSigner {
    api_key: String,
    api_secret: Vec<u8>,
}

impl KrakenSigner {
    /// Build a signer from the API key and the base64-encoded secret.
    pub fn new(api_key: impl Into<String>, api_secret_b64: &str) -> VenueResult<KrakenSigner> {
        let api_secret = BASE64.decode(api_secret_b64.trim()).map_err(|e| {
            VenueError::new(VenueId::Kraken, format!("invalid base64 API secret: {}", e))
        })?;
        Ok(KrakenSigner {
            api_key: api_key.into(),
            api_secret,
        })
    }

    /// Sign one private request. `post_data` must already contain the
    /// nonce field.
    pub fn sign(&self, uri_path: &str, post_data: &str, nonce: u64) -> String {
        let mut message = nonce.to_string().into_bytes();
        message.extend_from_slice(post_data.as_bytes());
        let digest = sha256_digest(&message);

        let mut signed = uri_path.as_bytes().to_vec();
        signed.extend_from_slice(&digest);
        hmac_sha512_b64(&self.api_secret, &signed)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for KrakenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the secret
        f.debug_struct("KrakenSigner")
            .field("api_key", &self.api_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "test_api_key";
    // base64 of "test_secret_key_12345"
    const TEST_SECRET_B64: &str = "dGVzdF9zZWNyZXRfa2V5XzEyMzQ1";

    #[test]
    fn test_rejects_bad_base64() {
        assert!(KrakenSigner::new(TEST_KEY, "not-valid-base64!!!").is_err());
    }

    #[test]
    fn test_signature_is_deterministic() {
        let signer = KrakenSigner::new(TEST_KEY, TEST_SECRET_B64).unwrap();
        let a = signer.sign("/0/private/Balance", "nonce=1234567890", 1234567890);
        let b = signer.sign("/0/private/Balance", "nonce=1234567890", 1234567890);
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_varies_with_inputs() {
        let signer = KrakenSigner::new(TEST_KEY, TEST_SECRET_B64).unwrap();
        let base = signer.sign("/0/private/Balance", "nonce=1", 1);

        assert_ne!(base, signer.sign("/0/private/OpenOrders", "nonce=1", 1));
        assert_ne!(base, signer.sign("/0/private/Balance", "nonce=2", 2));
    }

    #[test]
    fn test_signature_decodes_to_hmac_width() {
        let signer = KrakenSigner::new(TEST_KEY, TEST_SECRET_B64).unwrap();
        let signature = signer.sign("/0/private/Balance", "nonce=123", 123);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(signature)
            .unwrap();
        assert_eq!(decoded.len(), 64);
    }
}
