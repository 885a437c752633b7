use crate::{CoreError, ErrorExt};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_delay(attempt, self)
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after a delay dictated by the failure (rate limits)
    RetryWithDelay(Duration),
    /// Don't retry (permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
    let exponential_delay = Duration::from_millis(delay_ms.min(config.max_delay_ms));

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Re-run `operation` until it succeeds or `max_attempts` attempts have failed.
///
/// Every failure is retried; `backoff(n)` is awaited after the `n`-th failed
/// attempt (0-based). On exhaustion the last underlying error is returned.
pub async fn with_retry<T, E, F, Fut, B>(
    operation_name: &str,
    max_attempts: u32,
    backoff: B,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(u32) -> Duration,
    E: Display,
{
    retry_classified(
        operation_name,
        max_attempts,
        backoff,
        |_: &E| RetryStrategy::Retry,
        operation,
    )
    .await
}

/// Like [`with_retry`], but `classify` may stop early on permanent failures
/// or replace the backoff delay with one dictated by the error.
pub async fn retry_classified<T, E, F, Fut, B, C>(
    operation_name: &str,
    max_attempts: u32,
    backoff: B,
    classify: C,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    B: Fn(u32) -> Duration,
    C: Fn(&E) -> RetryStrategy,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut failures: u32 = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if failures > 0 {
                    info!(
                        "Operation {} succeeded after {} retries",
                        operation_name, failures
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                failures += 1;
                warn!(
                    operation = operation_name,
                    attempt = failures,
                    max_attempts,
                    error = %err,
                    "Attempt failed"
                );

                if failures >= max_attempts {
                    error!(
                        "Operation {} failed after {} attempts",
                        operation_name, failures
                    );
                    return Err(err);
                }

                let delay = match classify(&err) {
                    RetryStrategy::NoRetry => {
                        debug!("Not retrying {} due to error type: {}", operation_name, err);
                        return Err(err);
                    }
                    RetryStrategy::Retry => backoff(failures - 1),
                    RetryStrategy::RetryWithDelay(delay) => delay,
                };

                debug!("Retrying {} in {:?}", operation_name, delay);
                sleep(delay).await;
            }
        }
    }
}

/// Retry executor for [`CoreError`] operations, classifying failures with
/// [`get_retry_strategy`] and backing off per its [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        retry_classified(
            operation_name,
            self.config.max_attempts,
            |attempt| calculate_delay(attempt, &self.config),
            |err: &CoreError| match get_retry_strategy(err) {
                RetryStrategy::RetryWithDelay(delay) => {
                    RetryStrategy::RetryWithDelay(delay.min(max_delay))
                }
                other => other,
            },
            operation,
        )
        .await
    }
}
