//! Shared HTTP client for HTTP-based providers
//!
//! One `reqwest::Client` per backend family with connection reuse, a per-request
//! timeout and bounded retry for 5xx and transport failures.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use forgeloop_utils::error::CollaboratorError;

/// Upper bound on any single request (one hour)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(3600);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Retries for 5xx and network failures (so at most 3 attempts)
const MAX_RETRIES: u32 = 2;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
    backoff: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, CollaboratorError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| {
                CollaboratorError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
            backoff: INITIAL_BACKOFF,
        })
    }

    #[cfg(test)]
    fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Execute a request with timeout and retry.
    ///
    /// - timeout: `min(request_timeout, max_timeout)` per attempt
    /// - 5xx and transport failures are retried up to [`MAX_RETRIES`] times
    ///   with linear backoff
    /// - 4xx and timeouts are never retried
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, CollaboratorError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| {
                    CollaboratorError::Misconfiguration(
                        "request body cannot be cloned for retry".to_string(),
                    )
                })?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| {
                    CollaboratorError::Misconfiguration(format!("Failed to build request: {e}"))
                })?;

            debug!(
                provider = provider_name,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                provider = provider_name,
                                attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(self.backoff * attempt).await;
                            continue;
                        }
                        return Err(CollaboratorError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(CollaboratorError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt,
                            error = %redact_error_message(&e.to_string()),
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.backoff * attempt).await;
                        continue;
                    }

                    return Err(CollaboratorError::Unavailable(format!(
                        "{provider_name} request failed: {}",
                        redact_error_message(&e.to_string())
                    )));
                }
            }
        }
    }
}

/// Map 4xx statuses: 401/403 → auth, 429 → quota, anything else → misconfiguration
fn map_client_error(status: StatusCode, provider_name: &str) -> CollaboratorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CollaboratorError::ProviderAuth(
            format!("{provider_name} authentication failed: {status}"),
        ),
        StatusCode::TOO_MANY_REQUESTS => CollaboratorError::ProviderQuota(format!(
            "{provider_name} rate limit exceeded: {status}"
        )),
        _ => CollaboratorError::Misconfiguration(format!(
            "{provider_name} rejected the request: {status}"
        )),
    }
}

static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s/]+:[^@\s/]+@").expect("valid regex"));

static BEARER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+").expect("valid regex"));

/// Strip credentials from transport error text before logging it.
pub(crate) fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    BEARER_TOKEN.replace_all(&redacted, "$1[REDACTED]").to_string()
}
