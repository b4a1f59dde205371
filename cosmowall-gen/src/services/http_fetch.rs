//! HTTP fetch with retry and backoff
//!
//! Every upstream call (API JSON, image bytes, relay pass-through) goes
//! through [`FetchClient`], so tests can swap the network for a fake.
//!
//! **Retry policy:**
//! - Up to `max_attempts` tries (3 by default)
//! - HTTP 429: wait `rate_limited_backoff × attempt` (2000ms base)
//! - Any other failure: wait `failure_backoff × attempt` (1000ms base)
//! - No wait after the final attempt; the last error is returned

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

/// Identifying user agent sent on every upstream request
pub const USER_AGENT: &str = "cosmowall/0.1.0 (wallpaper generator; +https://github.com/cosmowall/cosmowall)";

/// Upstream fetch errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Raw upstream response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET-only HTTP client seam
#[async_trait]
pub trait FetchClient: Send + Sync {
    /// Perform one GET. Non-2xx statuses are returned, not raised.
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed [`FetchClient`]
#[derive(Clone)]
pub struct ReqwestFetcher {
    http_client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Client with the fixed user agent and a per-call timeout
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl FetchClient for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?
            .to_vec();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Retry/backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limited_backoff: Duration,
    pub failure_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limited_backoff: Duration::from_millis(2000),
            failure_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, error: &FetchError, attempt: u32) -> Duration {
        let base = match error {
            FetchError::RateLimited(_) => self.rate_limited_backoff,
            _ => self.failure_backoff,
        };
        base * attempt
    }
}

/// Map a non-2xx response onto the error taxonomy
pub fn check_status(response: FetchResponse, url: &str) -> Result<FetchResponse, FetchError> {
    match response.status {
        s if (200..300).contains(&s) => Ok(response),
        429 => Err(FetchError::RateLimited(redact_api_key(url))),
        status => Err(FetchError::Status {
            status,
            url: redact_api_key(url),
        }),
    }
}

/// GET `url` with retry; returns the first successful response
pub async fn fetch_with_retry<C>(
    client: &C,
    url: &str,
    policy: &RetryPolicy,
) -> Result<FetchResponse, FetchError>
where
    C: FetchClient + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let result = match client.get(url).await {
            Ok(response) => check_status(response, url),
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => {
                if attempt > 1 {
                    tracing::debug!(url = %redact_api_key(url), attempt, "Fetch succeeded after retry");
                }
                return Ok(response);
            }
            Err(err) if attempt >= max_attempts => {
                tracing::warn!(
                    url = %redact_api_key(url),
                    attempts = attempt,
                    error = %err,
                    "Fetch failed, retries exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for(&err, attempt);
                tracing::debug!(
                    url = %redact_api_key(url),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Fetch failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Retrying GET followed by JSON decode
pub async fn fetch_json<T, C>(client: &C, url: &str, policy: &RetryPolicy) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    C: FetchClient + ?Sized,
{
    let response = fetch_with_retry(client, url, policy).await?;
    serde_json::from_slice(&response.body).map_err(|e| FetchError::Parse(e.to_string()))
}

/// Hide the `api_key` query value so URLs can be logged
pub fn redact_api_key(raw: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if !parsed.query_pairs().any(|(k, _)| k == "api_key") {
        return raw.to_string();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_key" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    parsed.query_pairs_mut().clear().extend_pairs(pairs);
    parsed.to_string()
}
