//! Bounded-time retry with exponential backoff.
//!
//! [`retry`] keeps re-running an operation until it succeeds or a wall-clock
//! budget is spent. It is used for eventually-consistent reads (waiting for a
//! commit or a workflow run to show up) and for provisioning writes that may
//! race with repository initialisation on the provider side.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tokio::time::{Instant, sleep};

use crate::source::{Result, SourceError, short_error_message};

/// Shortest delay between attempts.
pub const MIN_DELAY: Duration = Duration::from_millis(10);

/// Longest delay between attempts.
pub const MAX_DELAY: Duration = Duration::from_secs(5);

/// Growth factor applied to the delay after each failed attempt.
pub const BACKOFF_FACTOR: f32 = 1.5;

/// Configuration for the backoff between attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub factor: f32,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: MIN_DELAY,
            max_delay: MAX_DELAY,
            factor: BACKOFF_FACTOR,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, factor: f32) -> Self {
        Self {
            min_delay,
            max_delay,
            factor,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an unbounded exponential backoff strategy from this configuration.
    ///
    /// The number of attempts is limited by the caller's deadline, not by the
    /// strategy.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(usize::MAX);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Run `operation` until it succeeds or `timeout` has elapsed.
///
/// The closure receives the attempt number, starting at 1. A zero timeout
/// means exactly one attempt. The deadline is checked before each attempt,
/// so an attempt that has already started always runs to completion; on
/// expiry the last error is returned wrapped in
/// [`SourceError::RetryTimeoutExceeded`].
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use scc::retry::retry;
///
/// let commit = retry(Duration::from_secs(20), |_| async {
///     api.get_commit(&token, owner, repo, sha).await
/// })
/// .await?;
/// ```
pub async fn retry<T, F, Fut>(timeout: Duration, operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_with_config(&RetryConfig::default(), timeout, operation).await
}

/// [`retry`] with a custom backoff configuration.
pub async fn retry_with_config<T, F, Fut>(
    config: &RetryConfig,
    timeout: Duration,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if timeout.is_zero() {
        return operation(1)
            .await
            .map_err(|err| SourceError::retry_timeout("single attempt", err));
    }

    let deadline = Instant::now() + timeout;
    // One generator per call; never shared between concurrent retries.
    let mut backoff = config.clone().into_backoff().build();
    let mut attempt = 1u32;

    loop {
        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let delay = backoff
            .next()
            .unwrap_or(config.max_delay)
            .min(config.max_delay);
        tracing::debug!(
            "Attempt {} failed, retrying in {:?}: {}",
            attempt,
            delay,
            short_error_message(&err)
        );
        sleep(delay).await;
        attempt += 1;

        if Instant::now() >= deadline {
            return Err(SourceError::retry_timeout("deadline exceeded", err));
        }
    }
}
