//! Shared `reqwest::Client` construction for provider adapters.
//!
//! Each configured provider gets its own client, since connect/read/write
//! timeouts are per-provider rather than global.

use std::time::Duration;

use axum::http;
use reqwest::Client;

use config::ProviderConfig;

/// Builds a client for one configured provider, applying its connect/read/
/// write timeouts on top of the pool defaults that keep connections warm
/// across requests.
pub(crate) fn build(provider: &ProviderConfig) -> reqwest::Result<Client> {
    let mut headers = http::HeaderMap::new();
    headers.insert(http::header::CONNECTION, http::HeaderValue::from_static("keep-alive"));

    Client::builder()
        .connect_timeout(Duration::from_secs(provider.connect_timeout_secs))
        .timeout(Duration::from_secs(provider.read_timeout_secs))
        // Hyper's connection pool has no per-connection TTL, only an idle
        // timeout; 5 seconds is the smallest value that still picks up DNS
        // changes under sustained load without thrashing the pool.
        .pool_idle_timeout(Some(Duration::from_secs(5)))
        .tcp_nodelay(true)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .default_headers(headers)
        .build()
}
