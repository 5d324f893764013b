//! HTTP transport for the upstream API
//!
//! `ApiTransport` is the single-attempt seam the rate-limited client retries
//! over; implement it to swap the wire for tests. The production
//! implementation is a thin `reqwest` wrapper that also lifts the
//! rate-limit headers out of each response.

use async_trait::async_trait;
use bytes::Bytes;
use faultstash_core::{BackupError, Result};
use std::time::Duration;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const RATE_LIMIT_LIMIT: &str = "X-RateLimit-Limit";
const RATE_LIMIT_REMAINING: &str = "X-RateLimit-Remaining";
const RATE_LIMIT_RESET: &str = "X-RateLimit-Reset";

/// Rate-limit metadata lifted from one response. Absent or malformed header
/// values read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    pub limit: i64,
    pub remaining: i64,
    pub reset_epoch: i64,
}

/// One successful API response: raw body plus rate-limit metadata.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub body: Bytes,
    pub rate_limit: RateLimitSnapshot,
}

/// A single GET attempt against the upstream API. Retrying is the caller's
/// concern; an implementation reports every failure as
/// [`BackupError::Transport`].
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<ApiResponse>;
}

/// Production transport over `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| BackupError::Transport(format!("http client build failed: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn get(&self, url: &str) -> Result<ApiResponse> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| BackupError::Transport(format!("GET {url} failed: {err}")))?;

        // A non-success status is a transport failure: only the body of a
        // successful response is ever decoded.
        if !response.status().is_success() {
            return Err(BackupError::Transport(format!(
                "GET {url} returned status {}",
                response.status()
            )));
        }

        let rate_limit = snapshot_from_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| BackupError::Transport(format!("failed to read body of {url}: {err}")))?;

        Ok(ApiResponse { body, rate_limit })
    }
}

fn snapshot_from_headers(headers: &reqwest::header::HeaderMap) -> RateLimitSnapshot {
    RateLimitSnapshot {
        limit: header_i64(headers, RATE_LIMIT_LIMIT),
        remaining: header_i64(headers, RATE_LIMIT_REMAINING),
        reset_epoch: header_i64(headers, RATE_LIMIT_RESET),
    }
}

fn header_i64(headers: &reqwest::header::HeaderMap, name: &str) -> i64 {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}
