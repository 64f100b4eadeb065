//! Exponential backoff with jitter for retryable AWS errors (throttling,
//! transient network failures). Bounded by a small number of attempts so a
//! persistently-unavailable account fails fast rather than hanging.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RunConfig;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_config(config: &RunConfig) -> Self {
        RetryPolicy {
            max_retries: config.max_retries,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }

    /// Full jitter backoff (AWS's own recommendation): delay is a uniform
    /// random draw between 0 and `min(max_delay_ms, base_delay_ms * 2^attempt)`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(20));
        let capped = exponential.min(self.max_delay_ms);
        let jittered = rand::thread_rng().gen_range(0..=capped.max(1));
        Duration::from_millis(jittered)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 3000,
        }
    }
}

/// Run `operation` until it succeeds, returns a non-retryable error, or
/// exhausts `policy.max_retries`. The last error is returned on exhaustion.
pub async fn retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                tokio::time::sleep(policy.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let calls = AtomicU32::new(0);
        let result = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_up_to_the_cap() {
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::rate_limit("throttled")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry(&policy, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::validation("bad input")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
