//! Whole-job retry with a fixed delay
//!
//! A failed run is retried from scratch; individual families are never
//! retried on their own.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

use crate::observability::{JobMetrics, StructuredLogger};

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. The last error is returned
/// once every attempt has failed.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    logger: &StructuredLogger,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let metrics = JobMetrics::new();
    let mut attempt = 1;

    loop {
        metrics.inc_run_attempts();
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                metrics.inc_run_failures();
                if attempt >= policy.max_attempts() {
                    logger.log_run_failed(attempt, &err);
                    return Err(err);
                }
                logger.log_run_retry(attempt, policy.max_retries, policy.delay.as_secs(), &err);
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
