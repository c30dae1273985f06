//! Retry policy for reopening a dropped gateway.
//!
//! The default policy retries immediately and forever. A delay curve and an
//! attempt cap can be configured for deployments that want to be gentler
//! on the remote.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound on the delay between attempts, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Maximum number of attempts (None = infinite).
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            max_attempts: None,
        }
    }
}

impl ReconnectConfig {
    /// Calculate the delay after the given failed attempt.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exponent);
        let delay_millis = (self.initial_delay_ms as f64 * multiplier).min(self.max_delay_ms as f64);
        Duration::from_millis(delay_millis as u64)
    }

    /// Check whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub const fn should_reconnect(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}

/// Run `attempt_fn` until it succeeds or the policy gives up.
///
/// `on_failure` sees every failed attempt, numbered from 1. When the policy
/// gives up, the last error is returned together with the attempt count.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    config: &ReconnectConfig,
    mut attempt_fn: F,
    mut on_failure: R,
) -> Result<T, (u32, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match attempt_fn().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                on_failure(attempt, &e);
                if !config.should_reconnect(attempt) {
                    return Err((attempt, e));
                }

                let delay = config.delay_for_attempt(attempt);
                if delay.is_zero() {
                    tokio::task::yield_now().await;
                } else {
                    sleep(delay).await;
                }
            }
        }
    }
}
