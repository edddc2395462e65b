//! Retry policies for request operations.
//!
//! A request operation never decides on its own whether to try again. After a
//! failed attempt it asks its [`RetryPolicy`] and either re-executes (after
//! the returned delay) or finishes with the failure.
//!
//! # Example
//!
//! ```rust
//! use volley_runtime::retry::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let policy = ExponentialBackoff::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .jitter(false)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use volley_core::{NetworkError, RetryDecision, RetryPolicy};

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn decide(&self, _attempt: u32, _error: &NetworkError) -> RetryDecision {
        RetryDecision::GiveUp
    }
}

/// Exponential backoff for retryable failures.
///
/// Only errors for which [`NetworkError::is_retryable`] holds are retried.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 100ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `jitter`: enabled
///
/// Deserialisable from any `serde` source; missing fields take these
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoff {
    /// Maximum number of re-executions after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Scale each delay by a random factor in `0.5..=1.0`
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ExponentialBackoff {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
            jitter: None,
        }
    }

    /// Delay before retry number `retry` (0-indexed: 0 = first retry).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^retry`, capped
    /// at `max_delay`, then scaled by jitter when enabled.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        use rand::Rng;

        #[allow(clippy::cast_possible_wrap)] // retry counts are tiny
        let base_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(retry as i32);

        let capped = match Duration::try_from_secs_f64(base_secs) {
            Ok(base) => base.min(self.max_delay),
            Err(_) if base_secs < 0.0 => Duration::ZERO,
            // Too large for a Duration, infinite or NaN
            Err(_) => self.max_delay,
        };

        if !self.jitter {
            return capped;
        }

        let factor = rand::thread_rng().gen_range(0.5..=1.0);
        Duration::try_from_secs_f64(capped.as_secs_f64() * factor).unwrap_or(capped)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn decide(&self, attempt: u32, error: &NetworkError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }

        // `attempt` attempts have been made, so `attempt - 1` retries so far
        let retries_so_far = attempt.saturating_sub(1);
        if retries_so_far >= self.max_retries {
            tracing::debug!(
                attempt,
                max_retries = self.max_retries,
                error = %error,
                "Retries exhausted"
            );
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry {
            delay: self.delay_for_attempt(retries_so_far),
        }
    }
}

/// Builder for [`ExponentialBackoff`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoffBuilder {
    max_retries: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<bool>,
}

impl ExponentialBackoffBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Enable or disable jitter.
    #[must_use]
    pub const fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the [`ExponentialBackoff`].
    #[must_use]
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            max_retries: self.max_retries.unwrap_or(3),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(100)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
            jitter: self.jitter.unwrap_or(true),
        }
    }
}
