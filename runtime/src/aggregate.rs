use crate::wait_group::DoneGuard;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use volley_core::{CorrelatedOutcome, NetworkError, NetworkResult, Outcome, Response};

/// Exclusive-access accumulator for one batch.
///
/// Every append happens under the mutex; the outcome is taken only after the
/// batch's barrier released, when no appends remain.
pub(crate) struct Aggregator<T> {
    partition: Mutex<Partition<T>>,
}

struct Partition<T> {
    successes: Vec<(T, Response)>,
    failures: Vec<(T, NetworkError)>,
}

impl<T> Aggregator<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            partition: Mutex::new(Partition {
                successes: Vec::with_capacity(capacity),
                failures: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Partition<T>> {
        self.partition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, payload: T, result: NetworkResult) {
        let mut partition = self.lock();
        match result {
            Ok(response) => partition.successes.push((payload, response)),
            Err(error) => partition.failures.push((payload, error)),
        }
    }

    /// Number of entries recorded so far.
    pub(crate) fn recorded(&self) -> usize {
        let partition = self.lock();
        partition.successes.len() + partition.failures.len()
    }

    pub(crate) fn take(&self) -> CorrelatedOutcome<T> {
        let mut partition = self.lock();
        Outcome::new(
            std::mem::take(&mut partition.successes),
            std::mem::take(&mut partition.failures),
        )
    }
}

/// One child's place in the batch.
///
/// Filling the slot records the child's result and counts down the barrier.
/// A slot dropped unfilled (its child was abandoned) records a `Cancelled`
/// failure instead, so the batch always reaches its full count.
pub(crate) struct ResultSlot<T> {
    payload: Option<T>,
    aggregator: Arc<Aggregator<T>>,
    _done: DoneGuard,
}

impl<T> ResultSlot<T> {
    pub(crate) fn new(payload: T, aggregator: Arc<Aggregator<T>>, done: DoneGuard) -> Self {
        Self {
            payload: Some(payload),
            aggregator,
            _done: done,
        }
    }

    pub(crate) fn fill(mut self, result: &NetworkResult) {
        if let Some(payload) = self.payload.take() {
            self.aggregator.record(payload, result.clone());
        }
    }
}

impl<T> Drop for ResultSlot<T> {
    fn drop(&mut self) {
        if let Some(payload) = self.payload.take() {
            tracing::warn!("Batch child dropped without reporting, recording as cancelled");
            self.aggregator.record(payload, Err(NetworkError::Cancelled));
        }
    }
}
