//! Reactive handling of provider secondary rate limits.
//!
//! GitHub answers bursts of writes with a "secondary rate limit" reply that
//! names a cooldown. Calls wrapped in [`with_rate_limit_retry`] wait out that
//! cooldown and try again; every other failure is returned untouched. There
//! is no local request pacing: the wrapper only reacts to what the provider
//! says.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use super::config::SourceConfig;
use super::errors::{Result, SourceError, short_error_message};

/// Budget for one rate-limited call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Wall-clock budget across attempts and cooldowns.
    pub timeout: Duration,
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&SourceConfig::default())
    }
}

impl From<&SourceConfig> for RateLimitPolicy {
    fn from(config: &SourceConfig) -> Self {
        Self {
            timeout: config.rate_limit_timeout(),
            max_attempts: config.rate_limit_retry_count,
        }
    }
}

/// Run `call`, sleeping out secondary rate limits between attempts.
///
/// The wait is exactly the provider's `retry_after`, with no extra backoff.
/// Once `max_attempts` calls have been made, or the next cooldown would run
/// past `timeout`, the last rate-limit error is returned wrapped in
/// [`SourceError::RetryTimeoutExceeded`]. A zero attempt budget is treated as
/// one attempt.
///
/// The cooldown is checked against the budget before sleeping, so a
/// `retry_after` longer than `timeout` is never honoured: the call is made
/// once and fails without waiting.
pub async fn with_rate_limit_retry<T, F, Fut>(policy: &RateLimitPolicy, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let Some(retry_after) = err.retry_after() else {
            return Err(err);
        };

        if attempts >= max_attempts {
            return Err(SourceError::retry_timeout("reached retry limit", err));
        }
        if started.elapsed() + retry_after > policy.timeout {
            return Err(SourceError::retry_timeout("rate limit cooldown exceeds timeout", err));
        }

        tracing::debug!(
            "Secondary rate limit hit, waiting {:?} (attempt {}/{}): {}",
            retry_after,
            attempts,
            max_attempts,
            short_error_message(&err)
        );
        sleep(retry_after).await;
    }
}
