//! Shared HTTP transport for the venue REST clients.
//!
//! One timeout-bounded [`reqwest::Client`] per adapter. The transport's
//! only jobs are issuing the request and getting JSON back: connection
//! errors, timeouts, and non-JSON bodies are mapped to [`VenueError`]
//! immediately (reads are never silently retried here), while venue-level
//! success/error envelopes are left for each adapter to interpret, since a
//! venue frequently reports business errors inside a perfectly valid JSON
//! response.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use crate::venue::error::{VenueError, VenueResult};
use crate::venue::types::VenueId;

/// Default request timeout for venue calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A timeout-bounded HTTP client shared by one venue adapter.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<HttpTransport, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }

    /// Unauthenticated GET returning the parsed JSON body.
    pub async fn get(
        &self,
        venue: VenueId,
        url: &str,
        query: &[(&str, String)],
    ) -> VenueResult<Value> {
        debug!(%venue, url, "GET");
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        self.dispatch(venue, url, request).await
    }

    /// POST with a pre-encoded form body and venue auth headers.
    pub async fn post_form(
        &self,
        venue: VenueId,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> VenueResult<Value> {
        debug!(%venue, url, "POST (form)");
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        self.dispatch(venue, url, request).await
    }

    /// POST with a JSON body and venue auth headers.
    pub async fn post_json(
        &self,
        venue: VenueId,
        url: &str,
        body: String,
        headers: &[(&str, String)],
    ) -> VenueResult<Value> {
        debug!(%venue, url, "POST (json)");
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        self.dispatch(venue, url, request).await
    }

    async fn dispatch(
        &self,
        venue: VenueId,
        url: &str,
        request: RequestBuilder,
    ) -> VenueResult<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| VenueError::new(venue, format!("{} while sending to {}", e, url)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VenueError::new(venue, format!("{} while reading from {}", e, url)))?;

        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => Err(VenueError::new(
                venue,
                format!("HTTP {}: {}", status.as_u16(), body),
            )),
            Err(_) => Err(VenueError::new(
                venue,
                format!("response was not valid json: {}", body),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_builds_with_timeout() {
        let transport = HttpTransport::new(DEFAULT_TIMEOUT);
        assert!(transport.is_ok());
    }
}
