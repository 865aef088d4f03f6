//! Shared HTTP client for all sources
//!
//! One pooled `reqwest::Client` serves every partition in the process.
//! Budgets are deliberately NOT shared here: each harvester owns its own
//! budget tracker, and partitions map to distinct API keys.

use once_cell::sync::OnceCell;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::fetcher::{FetcherError, FetcherResult};

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - overall time for the entire request
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

static GLOBAL_HTTP_CLIENT: OnceCell<Arc<Client>> = OnceCell::new();

/// Build a client with the standard timeouts
pub fn build_http_client() -> FetcherResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("match-harvester/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| {
            FetcherError::Config(format!(
                "Failed to build HTTP client: {e}. Check system TLS configuration."
            ))
        })
}

/// The process-wide client, built on first use
///
/// Returns a clone of the Arc, which is cheap (just increments ref count)
pub fn global_http_client() -> FetcherResult<Arc<Client>> {
    GLOBAL_HTTP_CLIENT
        .get_or_try_init(|| build_http_client().map(Arc::new))
        .cloned()
}
