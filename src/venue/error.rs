//! The single error type surfaced by venue operations.
//!
//! Every failure, whether transport trouble, a malformed response, a
//! venue-reported business error, or exhausted retries, reaches the
//! caller as a [`VenueError`] carrying the venue id and the venue's own
//! message verbatim. Callers that need finer discrimination match on
//! message substrings or use the best-effort [`VenueError::hint`]
//! classifier.

use thiserror::Error;

use super::types::VenueId;

/// Result type for venue operations.
pub type VenueResult<T> = Result<T, VenueError>;

/// An error from one of the venues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{venue}: {message}")]
pub struct VenueError {
    /// The venue the failure came from.
    pub venue: VenueId,
    /// The venue's message, verbatim where the venue supplied one.
    pub message: String,
}

/// Coarse classification of a venue error, derived from known message
/// patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHint {
    /// Likely to succeed on retry: network trouble, rate limits, venue-side
    /// locks.
    Transient,
    /// The venue refused the request: bad parameters, insufficient funds,
    /// below minimum size.
    Rejected,
    /// The referenced order or resource does not exist.
    NotFound,
    /// No known pattern matched.
    Unclassified,
}

const TRANSIENT_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "error sending request",
    "rate limit",
    "too many requests",
    "still processing",
    "temporarily",
    "service unavailable",
];

const NOT_FOUND_PATTERNS: &[&str] = &[
    "unknown order",
    "order not found",
    "order does not exist",
    "not found",
];

const REJECTED_PATTERNS: &[&str] = &[
    "insufficient",
    "not enough",
    "minimum",
    "invalid",
    "below",
    "rejected",
    "unknown pair",
    "permission denied",
];

impl VenueError {
    pub fn new(venue: VenueId, message: impl Into<String>) -> Self {
        Self {
            venue,
            message: message.into(),
        }
    }

    /// Best-effort classification from known message substrings.
    ///
    /// Most venues report errors as free-form strings with no structured
    /// code, so this is a heuristic: a message outside the known vocabulary
    /// lands in [`ErrorHint::Unclassified`], and a venue rewording its
    /// errors can misfile them. Treat the hint as advice, not truth.
    pub fn hint(&self) -> ErrorHint {
        let message = self.message.to_lowercase();
        if TRANSIENT_PATTERNS.iter().any(|p| message.contains(p)) {
            ErrorHint::Transient
        } else if NOT_FOUND_PATTERNS.iter().any(|p| message.contains(p)) {
            ErrorHint::NotFound
        } else if REJECTED_PATTERNS.iter().any(|p| message.contains(p)) {
            ErrorHint::Rejected
        } else {
            ErrorHint::Unclassified
        }
    }
}
