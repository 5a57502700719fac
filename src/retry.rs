// Retry policy for rate-limited upstream calls.
//
// Only rate-limit failures are retried; everything else surfaces on the first
// attempt. Delays grow exponentially with a random jitter so that many
// throttled callers do not retry in lockstep.

use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::{config::RetryConfig, error::GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    // `attempt` is zero-based: the initial call is attempt 0.
    pub fn should_retry(&self, error: &GatewayError, attempt: u32) -> RetryDecision {
        if !error.is_rate_limited() || attempt >= self.config.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(calculate_backoff(attempt, &self.config))
    }

    // Runs `producer` until it succeeds, fails terminally, or the retry budget
    // is spent. A spent budget surfaces as `RetriesExhausted` wrapping the
    // last rate-limit error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut producer: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match producer().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match self.should_retry(&err, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp if err.is_rate_limited() => {
                    return Err(GatewayError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }
}

// Exponential backoff with additive jitter:
// initial * 2^attempt (capped) + uniform(0, max_jitter)
pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
    let exponential = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(retry_attempt))
        .min(config.max_backoff_ms);

    let jitter = if config.max_jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..config.max_jitter_ms)
    };

    Duration::from_millis(exponential + jitter)
}
