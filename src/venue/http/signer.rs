//! Digest primitives for venue request signing.
//!
//! Venues mandate wildly different message-authentication schemes: the
//! digest algorithm (SHA-256/384/512, SHA-1, MD5) and the encoding (hex,
//! uppercase hex, base64) are venue requirements, not choices this library
//! makes. Each adapter composes its venue's message from these primitives;
//! given identical inputs every helper is deterministic, so there is never
//! a benefit to re-signing the same nonce.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha384 = Hmac<Sha384>;
type HmacSha512 = Hmac<Sha512>;

/// `key=value` pairs joined with `&`, in the given order. This is the
/// string most venues sign, so ordering must match the request body
/// exactly.
pub fn build_query_string(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn hmac_sha1_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha1::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha384_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha384::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha512_hex(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// HMAC-SHA512 with the raw digest base64-encoded (kraken's outer step).
pub fn hmac_sha512_b64(secret: &[u8], message: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Plain SHA-256 digest bytes (kraken's inner step).
pub fn sha256_digest(message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(message);
    hasher.finalize().to_vec()
}

/// MD5 of the message, lowercase hex. Mandated by a couple of the older
/// venues; not a security property of this library.
pub fn md5_hex(message: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(message);
    hex::encode(hasher.finalize())
}
