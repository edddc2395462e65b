//! Retry-decision capability.
//!
//! The operation layer only knows how to re-execute. Whether and when to do
//! so is delegated to a [`RetryPolicy`].

use crate::error::NetworkError;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-execute after waiting `delay`
    Retry {
        /// Pause before the next attempt
        delay: Duration,
    },
    /// Finish with the failure
    GiveUp,
}

impl RetryDecision {
    /// Retry immediately.
    pub const RETRY_NOW: Self = Self::Retry {
        delay: Duration::ZERO,
    };
}

/// Decides whether a failed operation re-executes.
pub trait RetryPolicy: Send + Sync {
    /// Called after attempt number `attempt` (1-based) failed with `error`.
    ///
    /// Never called for [`NetworkError::Cancelled`].
    fn decide(&self, attempt: u32, error: &NetworkError) -> RetryDecision;
}

impl<F> RetryPolicy for F
where
    F: Fn(u32, &NetworkError) -> RetryDecision + Send + Sync,
{
    fn decide(&self, attempt: u32, error: &NetworkError) -> RetryDecision {
        self(attempt, error)
    }
}
