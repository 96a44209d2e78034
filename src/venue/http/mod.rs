//! HTTP plumbing shared by the venue adapters: the timeout-bounded
//! transport and the digest primitives venues mandate for signing.

mod client;
mod signer;

pub use client::{HttpTransport, DEFAULT_TIMEOUT};
pub use signer::{
    build_query_string, hmac_sha1_hex, hmac_sha256_hex, hmac_sha384_hex, hmac_sha512_b64,
    hmac_sha512_hex, md5_hex, sha256_digest,
};
