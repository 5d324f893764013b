//! Rate-limit-aware API client
//!
//! Wraps an [`ApiTransport`] with the two behaviors every fetch needs: a
//! backoff when the upstream rate limiter reports zero remaining calls, and
//! the bounded retry policy for transient transport failures. Decoding a
//! malformed body is fatal and never retried.

use chrono::Utc;
use faultstash_core::{BackupError, Result, RetryPolicy};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::transport::{ApiTransport, RateLimitSnapshot};

/// How long to pause on the first consecutive zero-hit. The remaining count
/// is re-evaluated upstream about once a minute, so the first zero may not
/// reflect reality yet.
pub const ZERO_HIT_PAUSE: Duration = Duration::from_secs(60);

/// Observed state of the remote rate limiter.
///
/// `consecutive_zero_hits` counts back-to-back observations of zero
/// remaining calls; it resets the instant a response reports remaining > 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitState {
    limit: i64,
    remaining: i64,
    reset_epoch: i64,
    consecutive_zero_hits: u32,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    pub fn reset_epoch(&self) -> i64 {
        self.reset_epoch
    }

    /// Decides how long to sleep before the next request, given the current
    /// epoch time. Pure so the policy is testable without sleeping:
    ///
    /// - limiter not exhausted → no sleep
    /// - first consecutive zero-hit → short fixed pause, then proceed
    /// - second or later zero-hit → sleep until `reset_epoch` exactly, and
    ///   reset the counter
    pub fn backoff(&mut self, now_epoch: i64) -> Option<Duration> {
        if self.limit <= 0 || self.remaining != 0 {
            return None;
        }
        self.consecutive_zero_hits += 1;
        if self.consecutive_zero_hits > 1 {
            self.consecutive_zero_hits = 0;
            let wait = (self.reset_epoch - now_epoch).max(0);
            Some(Duration::from_secs(wait as u64))
        } else {
            Some(ZERO_HIT_PAUSE)
        }
    }

    /// Folds one response's rate-limit metadata into the state.
    pub fn observe(&mut self, snapshot: &RateLimitSnapshot) {
        self.limit = snapshot.limit;
        self.remaining = snapshot.remaining.max(0);
        self.reset_epoch = snapshot.reset_epoch;
        if self.remaining > 0 {
            self.consecutive_zero_hits = 0;
        }
        tracing::debug!(
            limit = self.limit,
            remaining = self.remaining,
            reset = self.reset_epoch,
            "rate limit"
        );
    }
}

/// Rate-limited, retrying API client. One instance is shared by every
/// paginator in a run so the limiter state spans the whole resource tree.
pub struct ApiClient<T: ApiTransport> {
    transport: T,
    retry: RetryPolicy,
    rate: RateLimitState,
}

impl<T: ApiTransport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_retry_policy(transport, RetryPolicy::default())
    }

    pub fn with_retry_policy(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            rate: RateLimitState::new(),
        }
    }

    pub fn rate_limit(&self) -> &RateLimitState {
        &self.rate
    }

    /// Issues one GET and decodes the response body.
    pub async fn issue<P: DeserializeOwned>(&mut self, url: &str) -> Result<P> {
        if let Some(delay) = self.rate.backoff(Utc::now().timestamp()) {
            tracing::warn!(
                remaining = self.rate.remaining(),
                reset = self.rate.reset_epoch(),
                pause_secs = delay.as_secs(),
                "rate limit exhausted, waiting"
            );
            tokio::time::sleep(delay).await;
        }

        let response = self.retry.run("api fetch", || self.transport.get(url)).await?;
        self.rate.observe(&response.rate_limit);

        serde_json::from_slice(&response.body)
            .map_err(|err| BackupError::Decode(format!("malformed response from {url}: {err}")))
    }
}
