//! Bounded retry policy
//!
//! One explicit policy shared by every transport call site: a fixed number
//! of attempts with no delay between them. Only errors the taxonomy marks
//! retryable are re-attempted; everything else propagates on the first
//! failure.

use std::future::Future;

use crate::error::Result;

/// Fixed-attempt retry policy with no inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// runs out of attempts. The last error is propagated.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::debug!(what, attempt, error = %err, "retrying after transport failure");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(flavor = "current_thread")]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::default()
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(BackupError::Transport("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackupError::Transport("timeout".into())) }
            })
            .await;
        assert!(matches!(result, Err(BackupError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn non_retryable_errors_propagate_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = RetryPolicy::default()
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackupError::Decode("unexpected token".into())) }
            })
            .await;
        assert!(matches!(result, Err(BackupError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
