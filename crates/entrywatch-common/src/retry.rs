//! Retry with exponential backoff and jitter for mutations.
//!
//! Mutations against the system under test can hit a cold admission webhook
//! and see "connection refused" for a while after install. Those failures are
//! retried here; anything the caller classifies as permanent (a rejected
//! object, a conflict) is returned on the first occurrence.
//!
//! This is deliberately separate from [`crate::poll`]: polling observes the
//! store at a fixed cadence, this module repeats a single write.
//!
//! # Example
//!
//! ```ignore
//! use entrywatch_common::retry::{retry_with_backoff, RetryConfig};
//!
//! let applied = retry_with_backoff(
//!     &RetryConfig::with_max_attempts(10),
//!     "apply_servicedefaults",
//!     |e: &kube::Error| is_transient(e),
//!     || async { api.patch(name, &params, &Patch::Apply(&obj)).await },
//! )
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff settings for a retried mutation
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on the delay between retries
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.backoff_multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
///
/// `is_retryable` decides whether an error is worth another attempt; a
/// `false` answer returns the error immediately. Delays grow by
/// `backoff_multiplier` up to `max_delay`, each jittered to 0.5x-1.5x.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !is_retryable(&e) {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "Operation failed permanently"
            );
            return Err(e);
        }

        if config.exhausted(attempt) {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis(),
            "Operation failed, retrying"
        );

        tokio::time::sleep(jittered_delay).await;
        delay = config.next_delay(delay);
    }
}
