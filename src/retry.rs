//! Retry logic with linear backoff
//!
//! Every failed attempt except the last is followed by a sleep of
//! `backoff_base * attempt_number`, so with the defaults (3 attempts, 3 s base)
//! an item that never succeeds waits 3 s, then 6 s, then gives up.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::retry_with_linear_backoff;
//! use media_dl::config::RetryConfig;
//!
//! # async fn example() -> Result<(), String> {
//! let config = RetryConfig::default();
//! let value = retry_with_linear_backoff(&config, |_attempt| async {
//!     // Your operation here
//!     Ok::<_, String>(42)
//! }, |_failure| {})
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::fetch::MediaFetchService;
use crate::request::AcquisitionRequest;
use crate::types::{ItemOutcome, ItemStatus};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Details of a failed attempt that will be retried
#[derive(Debug, Clone, Copy)]
pub struct RetryNotice<'a, E> {
    /// The attempt that failed (1-based)
    pub attempt: u32,
    /// Configured attempt limit
    pub max_attempts: u32,
    /// The error from that attempt
    pub error: &'a E,
    /// How long the executor will sleep before the next attempt
    pub delay: Duration,
}

/// Result of a retried operation, with the number of attempts it took
#[derive(Debug)]
pub struct Attempted<T, E> {
    /// Final result: the first success or the last error
    pub result: Result<T, E>,
    /// Number of times the operation was invoked
    pub attempts: u32,
}

/// Run `operation` up to `config.max_attempts` times with linear backoff
///
/// `operation` receives the 1-based attempt number. `on_retry` is called
/// before each backoff sleep, which makes it a convenient hook for events.
/// No sleep follows the final attempt.
pub async fn retry_with_linear_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation: F,
    on_retry: R,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(RetryNotice<'_, E>),
{
    run_attempts(config, operation, on_retry).await.result
}

async fn run_attempts<F, Fut, T, E, R>(
    config: &RetryConfig,
    mut operation: F,
    mut on_retry: R,
) -> Attempted<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(RetryNotice<'_, E>),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if attempt < max_attempts => {
                let delay = backoff_delay(config, attempt);

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                on_retry(RetryNotice {
                    attempt,
                    max_attempts,
                    error: &e,
                    delay,
                });

                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    attempts = attempt,
                    "Operation failed after all retry attempts exhausted"
                );
                return Attempted {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}

/// Sleep before the attempt following `failed_attempt`
pub fn backoff_delay(config: &RetryConfig, failed_attempt: u32) -> Duration {
    let delay = config.backoff_base.saturating_mul(failed_attempt);
    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

/// Wraps a fetch service's download call with the retry policy
///
/// Never returns an error: every failure is folded into the returned
/// [`ItemOutcome`].
#[derive(Clone)]
pub struct RetryExecutor {
    service: Arc<dyn MediaFetchService>,
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create an executor for `service`
    pub fn new(service: Arc<dyn MediaFetchService>, config: RetryConfig) -> Self {
        Self { service, config }
    }

    /// The retry policy in use
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Download `request`, retrying failures
    pub async fn attempt(&self, request: &AcquisitionRequest, title: &str) -> ItemOutcome {
        self.attempt_with(request, title, |_| {}).await
    }

    /// Like [`attempt`](Self::attempt), calling `on_retry` before every backoff
    pub async fn attempt_with<R>(
        &self,
        request: &AcquisitionRequest,
        title: &str,
        on_retry: R,
    ) -> ItemOutcome
    where
        R: FnMut(RetryNotice<'_, crate::error::FetchError>),
    {
        let service = &self.service;
        let attempted = run_attempts(
            &self.config,
            |attempt| {
                tracing::debug!(
                    url = %request.url,
                    attempt = attempt,
                    service = service.name(),
                    "Starting download attempt"
                );
                service.download(request)
            },
            on_retry,
        )
        .await;

        let status = match attempted.result {
            Ok(()) => ItemStatus::Succeeded,
            Err(e) => ItemStatus::Failed {
                error: e.to_string(),
            },
        };

        ItemOutcome {
            id: request.item_id.clone(),
            title: title.to_string(),
            status,
            attempts: attempted.attempts,
        }
    }
}
