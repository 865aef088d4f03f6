//! Ranked API HTTP client
//!
//! Issues a single authenticated GET per call and classifies the outcome:
//! - 2xx: body decoded as JSON
//! - 429: [`FetcherError::RateLimited`] with the `Retry-After` hint
//! - 5xx: [`FetcherError::Server`]
//! - other 4xx: [`FetcherError::Client`]
//! - transport failures: [`FetcherError::Timeout`] or [`FetcherError::Network`]
//!
//! There is no retry loop here; pacing and retries are the harvester's job.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::fetcher::riot_config::API_KEY_HEADER;
use crate::fetcher::{FetcherError, FetcherResult};

/// Longest error body kept in a [`FetcherError::Client`] message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Authenticated JSON client with round-robin key rotation
pub struct RiotHttpClient {
    client: Arc<Client>,
    keys: Vec<String>,
    next_key: AtomicUsize,
}

impl RiotHttpClient {
    /// Create a client rotating over `keys`.
    ///
    /// # Errors
    /// Returns [`FetcherError::Config`] when no non-empty key is given.
    pub fn new(client: Arc<Client>, keys: Vec<String>) -> FetcherResult<Self> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(FetcherError::Config(
                "no API key configured (set RIOT_API_KEYS or pass --api-key)".to_string(),
            ));
        }
        Ok(Self {
            client,
            keys,
            next_key: AtomicUsize::new(0),
        })
    }

    /// Number of keys in rotation
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn next_api_key(&self) -> &str {
        let index = self.next_key.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[index]
    }

    /// GET `url` with `params` and decode the JSON body
    pub async fn get_json(&self, url: &str, params: &[(&str, String)]) -> FetcherResult<Value> {
        debug!(url, params = params.len(), "Making GET request");

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, self.next_api_key())
            .query(params)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| FetcherError::Parse(format!("Failed to decode response: {e}")));
        }

        let retry_after = parse_retry_after(response.headers());
        let message = if status.as_u16() == 429 {
            String::new()
        } else {
            let body = response.text().await.unwrap_or_default();
            let reason = status.canonical_reason().unwrap_or("unknown status");
            if body.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{reason}: {}", truncate(&body, MAX_ERROR_BODY_CHARS))
            }
        };

        let err = FetcherError::from_status(status.as_u16(), retry_after, message);
        debug!(url, status = status.as_u16(), error = %err, "Request failed");
        Err(err)
    }
}

fn classify_transport_error(err: reqwest::Error) -> FetcherError {
    if err.is_timeout() {
        FetcherError::Timeout
    } else if err.is_decode() {
        FetcherError::Parse(err.to_string())
    } else {
        FetcherError::Network(err.to_string())
    }
}

/// Parse a `Retry-After` header given in (possibly fractional) seconds.
///
/// HTTP-date values and garbage are ignored. Values too large for a
/// [`Duration`] saturate to [`Duration::MAX`]; the budget tracker clamps them.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    match raw.parse::<f64>() {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => {
            Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
        }
        _ => {
            warn!(value = raw, "Ignoring unparseable Retry-After header");
            None
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.trim().to_string()
    } else {
        let short: String = s.chars().take(max).collect();
        format!("{}...", short.trim())
    }
}
