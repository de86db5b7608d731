//! Bounded convergence polling
//!
//! The reconciler applies changes asynchronously, so every check against the
//! store is a poll: observe, and if the observation isn't a pass yet, sleep
//! and observe again until the attempt budget runs out.
//!
//! Two cadences exist. [`PollConfig::cold_start`] covers the first
//! convergence after a deployment comes up, where leader election alone can
//! take close to a minute. [`PollConfig::steady_state`] covers a single
//! change against an already-running reconciler.
//!
//! # Example
//!
//! ```ignore
//! use entrywatch_common::poll::{poll_until, Observation, PollConfig};
//!
//! poll_until(&PollConfig::steady_state(), "service-defaults deleted", || async {
//!     match reader.get(&ns, RecordKind::ServiceDefaults, "defaults").await {
//!         Err(e) if e.is_not_found() => Observation::Pass,
//!         Err(e) => Observation::Retryable(e.to_string()),
//!         Ok(_) => Observation::Fail("still present".into()),
//!     }
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Attempt budget and cadence for one poll loop
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Maximum number of observations (0 is treated as 1)
    pub max_attempts: u32,
    /// Sleep between observations
    #[serde(rename = "interval_ms", with = "millis")]
    pub interval: Duration,
}

impl PollConfig {
    /// Create a config with an explicit budget
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// First convergence after startup: 60 attempts, 1s apart
    pub const fn cold_start() -> Self {
        Self::new(60, Duration::from_secs(1))
    }

    /// Convergence after one incremental change: 10 attempts, 500ms apart
    pub const fn steady_state() -> Self {
        Self::new(10, Duration::from_millis(500))
    }

    /// Nominal budget, `max_attempts * interval`.
    ///
    /// Actual sleeping is one interval shorter since the final attempt is not
    /// followed by a sleep.
    pub fn budget(&self) -> Duration {
        self.interval * self.attempts()
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Outcome of one observation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Observation {
    /// The expected state is visible
    Pass,
    /// The store answered, but not with the expected state
    Fail(String),
    /// The store couldn't be asked (connection refused, timeout, 5xx)
    Retryable(String),
}

/// Error returned when the attempt budget is spent without a pass
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollError {
    /// No observation passed within `attempts`
    #[error("gave up waiting for {description} after {attempts} attempts: {last_reason}")]
    Exhausted {
        /// What was being waited for
        description: String,
        /// Number of observations made
        attempts: u32,
        /// Reason reported by the final observation
        last_reason: String,
    },
}

impl PollError {
    /// Reason reported by the final observation
    pub fn last_reason(&self) -> &str {
        match self {
            Self::Exhausted { last_reason, .. } => last_reason,
        }
    }
}

/// Observe until a pass or until `config.max_attempts` observations are made.
///
/// Fail and Retryable observations take the same path: sleep
/// `config.interval`, then observe again. There is no sleep after a pass or
/// after the final attempt. Returns the 1-based attempt number that passed.
pub async fn poll_until<F, Fut>(
    config: &PollConfig,
    description: &str,
    mut observe: F,
) -> Result<u32, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Observation>,
{
    let max_attempts = config.attempts();
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        match observe().await {
            Observation::Pass => {
                info!(what = %description, attempt, "converged");
                return Ok(attempt);
            }
            Observation::Fail(reason) => {
                debug!(
                    what = %description,
                    attempt,
                    max_attempts,
                    reason = %reason,
                    "not converged yet"
                );
                last_reason = reason;
            }
            Observation::Retryable(reason) => {
                debug!(
                    what = %description,
                    attempt,
                    max_attempts,
                    error = %reason,
                    "backend unavailable"
                );
                last_reason = reason;
            }
        }

        if attempt < max_attempts {
            sleep(config.interval).await;
        }
    }

    warn!(
        what = %description,
        attempts = max_attempts,
        reason = %last_reason,
        "gave up waiting for convergence"
    );
    Err(PollError::Exhausted {
        description: description.to_string(),
        attempts: max_attempts,
        last_reason,
    })
}

mod millis {
    use std::time::Duration;

    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(d.as_millis())
            .map_err(|_| S::Error::custom(format!("interval too large: {d:?}")))?;
        s.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
