//! Immutable batch results.

use crate::error::NetworkError;
use crate::response::Response;

/// Partition of a batch's results into successes and failures.
///
/// Built once, after every request in the batch reported. Each submitted
/// request contributes exactly one entry to exactly one of the two lists, so
/// `successes().len() + failures().len()` always equals the number of
/// requests submitted. Entry order reflects completion order, not submission
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<S, F> {
    successes: Vec<S>,
    failures: Vec<F>,
}

/// Outcome of an uncorrelated batch.
pub type BatchOutcome = Outcome<Response, NetworkError>;

/// Outcome of a correlated batch: each entry carries its caller payload.
pub type CorrelatedOutcome<T> = Outcome<(T, Response), (T, NetworkError)>;

impl<S, F> Outcome<S, F> {
    /// Assemble an outcome from its two halves.
    #[must_use]
    pub const fn new(successes: Vec<S>, failures: Vec<F>) -> Self {
        Self {
            successes,
            failures,
        }
    }

    /// Outcome of a batch with nothing in it.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Successful entries.
    #[must_use]
    pub fn successes(&self) -> &[S] {
        &self.successes
    }

    /// Failed entries.
    #[must_use]
    pub fn failures(&self) -> &[F] {
        &self.failures
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// No entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every entry succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Take ownership of both halves.
    #[must_use]
    pub fn into_parts(self) -> (Vec<S>, Vec<F>) {
        (self.successes, self.failures)
    }

    /// Transform every entry, keeping the partition.
    pub fn map<S2, F2>(
        self,
        on_success: impl FnMut(S) -> S2,
        on_failure: impl FnMut(F) -> F2,
    ) -> Outcome<S2, F2> {
        Outcome {
            successes: self.successes.into_iter().map(on_success).collect(),
            failures: self.failures.into_iter().map(on_failure).collect(),
        }
    }
}

impl<S, F> Default for Outcome<S, F> {
    fn default() -> Self {
        Self::empty()
    }
}
