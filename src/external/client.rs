use std::time::Duration;

use crate::error::{AppError, AppResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the HTTP client for one outbound collaborator.
///
/// Each collaborator owns its client so its configured timeout bounds every
/// call it makes, including token requests.
///
/// # Features
/// - **Timeouts**: `timeout_secs` per request, 10s (or less) to connect
/// - **Connection pooling**: idle connections kept for 90s
/// - **Compression**: gzip responses
/// - **TLS**: Rustls
pub fn build_http_client(service: &str, timeout_secs: u64) -> AppResult<reqwest::Client> {
    let timeout = Duration::from_secs(timeout_secs.max(1));

    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Configuration {
            key: service.to_string(),
            source: anyhow::Error::from(e),
        })
}

/// Joins a configured base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
