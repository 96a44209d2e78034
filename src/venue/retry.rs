//! Bounded retry policy shared by the venue adapters.
//!
//! Reads are never silently retried: transport failures on idempotent
//! operations surface immediately and retrying is the caller's choice. Two
//! failure shapes do get in-library retries, both with numeric ceilings:
//! nonce rejections on signed calls (fresh nonce each attempt) and
//! venue-side "still processing" style responses on polling calls.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::error::{VenueError, VenueResult};

/// Attempts for a signed call rejected over its nonce.
pub const NONCE_RETRY_ATTEMPTS: u32 = 3;

/// Attempts for venue-side transient-lock responses.
pub const POLL_RETRY_ATTEMPTS: u32 = 5;

/// Fixed delay between poll attempts.
pub const POLL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Re-run `op` while `should_retry` matches the error, up to `attempts`
/// total tries. The operation obtains a fresh nonce on each invocation, so
/// a nonce collision between concurrent callers resolves itself.
pub async fn with_nonce_retry<T, F, Fut>(
    attempts: u32,
    should_retry: impl Fn(&VenueError) -> bool,
    mut op: F,
) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if should_retry(&err) && attempt < attempts => {
                debug!(venue = %err.venue, attempt, "nonce rejected, resubmitting");
                attempt += 1;
            }
            result => return result,
        }
    }
}

/// Re-run `op` with a fixed delay while `should_retry` matches, up to
/// `attempts` total tries. For venue responses like "request still
/// processing".
pub async fn with_poll_retry<T, F, Fut>(
    attempts: u32,
    delay: Duration,
    should_retry: impl Fn(&VenueError) -> bool,
    mut op: F,
) -> VenueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VenueResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if should_retry(&err) && attempt < attempts => {
                debug!(venue = %err.venue, attempt, "venue busy, retrying after delay");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
