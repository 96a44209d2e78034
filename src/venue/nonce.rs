//! Per-venue nonce sequencing.
//!
//! Several venues reject an authenticated request unless its nonce is
//! strictly greater than the last accepted one for that credential. The
//! [`NonceStore`] trait is the seam: production deployments back it with a
//! durable counter store so a process restart cannot reuse a nonce, while
//! [`MemoryNonceStore`] serves tests and single-process use.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use super::types::VenueId;

/// An atomically incrementing counter per venue.
pub trait NonceStore: Send + Sync {
    /// Create the venue's counter at `start` if absent. Returns `false`
    /// without touching the counter when one already exists, so bootstrap
    /// is idempotent.
    fn initialize(&self, venue: VenueId, start: u64) -> bool;

    /// Increment the venue's counter and return the new value.
    ///
    /// Must be linearizable: concurrent callers never observe the same
    /// value and the sequence is strictly increasing. A venue that was
    /// never initialized starts counting from zero.
    fn next(&self, venue: VenueId) -> u64;
}

/// In-process [`NonceStore`] guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryNonceStore {
    seqs: Mutex<HashMap<VenueId, u64>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NonceStore for MemoryNonceStore {
    fn initialize(&self, venue: VenueId, start: u64) -> bool {
        let mut seqs = self.seqs.lock().expect("nonce store lock poisoned");
        if seqs.contains_key(&venue) {
            return false;
        }
        seqs.insert(venue, start);
        true
    }

    fn next(&self, venue: VenueId) -> u64 {
        let mut seqs = self.seqs.lock().expect("nonce store lock poisoned");
        let seq = seqs.entry(venue).or_insert(0);
        *seq += 1;
        *seq
    }
}

/// Seed value for venues that cap the nonce at 32 bits.
///
/// btce rejects nonces above 4294967294, which raw epoch microseconds blow
/// through immediately. Counting tenths of a second and subtracting a fixed
/// offset keeps the seed small while still exceeding any nonce the account
/// used before the offset date. With `DECISECOND_OFFSET` anchored at
/// 2023-11-14 (epoch 1.7e9 s), the seed stays under the cap until the
/// decisecond count reaches `DECISECOND_OFFSET + u32::MAX`, i.e. mid-2037.
/// The seed does not wrap: past the horizon, `initialize` simply
/// hands out values the venue will reject, which surfaces as a normal
/// venue error rather than silent reuse.
pub const DECISECOND_OFFSET: u64 = 17_000_000_000;

/// Derive a bounded, strictly growing seed from the wall clock. See
/// [`DECISECOND_OFFSET`] for the overflow horizon.
pub fn decisecond_nonce_seed(now: SystemTime) -> u64 {
    let deciseconds = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
        / 100;
    deciseconds.saturating_sub(DECISECOND_OFFSET)
}

/// Epoch milliseconds, for venues whose nonce is a clock reading.
pub fn millisecond_nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Epoch microseconds, for venues that want finer clock nonces.
pub fn microsecond_nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
