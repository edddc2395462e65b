//! Fan-out/fan-in batch operations.
//!
//! A batch turns N requests into N child [`RequestOperation`]s, runs them
//! concurrently on the Tokio worker pool and assembles exactly one
//! [`Outcome`] once every child reported:
//!
//! ```text
//! execute()
//!   ├─ child 1 ──on_complete──┐
//!   ├─ child 2 ──on_complete──┼──▶ Aggregator (mutex) ──▶ WaitGroup::done()
//!   └─ child N ──on_complete──┘
//! WaitGroup::wait() ──▶ Outcome { successes, failures }   (len == N)
//! ```
//!
//! Children report in any order. Cancelled children are recorded as
//! [`NetworkError::Cancelled`] failures, so the outcome always holds N
//! entries.

use crate::aggregate::{Aggregator, ResultSlot};
use crate::config::BatchConfig;
use crate::metrics::BatchMetrics;
use crate::operation::{OperationPhase, RequestOperation};
use crate::wait_group::WaitGroup;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::Semaphore;
use volley_core::{
    BatchOutcome, BodyRequest, CorrelatedOutcome, NetworkError, Outcome, Requestable, Transport,
    Upstream,
};

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Result of a correlated batch.
pub type CorrelatedBatchResult<T> = Result<CorrelatedOutcome<T>, NetworkError>;

/// Result of a plain batch.
pub type BatchResult = Result<BatchOutcome, NetworkError>;

type BatchObserver<T> = Box<dyn FnOnce(&CorrelatedBatchResult<T>) + Send + 'static>;

/// Copies a finished result for observers that register late.
type Snapshot<T> = fn(&CorrelatedBatchResult<T>) -> CorrelatedBatchResult<T>;

struct BatchState<T> {
    phase: OperationPhase,
    cancel_requested: bool,
    children: Vec<RequestOperation>,
    observers: Vec<BatchObserver<T>>,
    retained: Option<CorrelatedBatchResult<T>>,
}

struct BatchShared<T> {
    id: u64,
    input: Mutex<Option<Upstream<Vec<BodyRequest<T>>>>>,
    transport: Arc<dyn Transport>,
    config: BatchConfig,
    snapshot: Option<Snapshot<T>>,
    state: Mutex<BatchState<T>>,
}

/// Batch that keeps a caller payload next to every result.
///
/// Payloads are moved into the outcome, never cloned, so callers can match
/// results back to their own objects by identity.
///
/// # Example
///
/// ```ignore
/// let users: Vec<Arc<User>> = load_users();
/// let items = users
///     .iter()
///     .map(|user| BodyRequest::new(&user.profile_request(), Arc::clone(user)))
///     .collect();
///
/// let batch = CorrelatedBatchOperation::new(Upstream::Ready(items), transport);
/// let outcome = batch.execute().await?;
///
/// for (user, error) in outcome.failures() {
///     tracing::warn!(user_id = %user.id, %error, "profile fetch failed");
/// }
/// ```
pub struct CorrelatedBatchOperation<T> {
    shared: Arc<BatchShared<T>>,
}

impl<T> Clone for CorrelatedBatchOperation<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Cancels the child if its task is torn down before the child finished.
struct CancelOnDrop(RequestOperation);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl<T: Send + 'static> CorrelatedBatchOperation<T> {
    /// Create a batch with the default [`BatchConfig`].
    pub fn new(items: Upstream<Vec<BodyRequest<T>>>, transport: Arc<dyn Transport>) -> Self {
        Self::with_config(items, transport, BatchConfig::default())
    }

    /// Create a batch with an explicit configuration.
    pub fn with_config(
        items: Upstream<Vec<BodyRequest<T>>>,
        transport: Arc<dyn Transport>,
        config: BatchConfig,
    ) -> Self {
        Self::build(items, transport, config, None)
    }

    fn build(
        items: Upstream<Vec<BodyRequest<T>>>,
        transport: Arc<dyn Transport>,
        config: BatchConfig,
        snapshot: Option<Snapshot<T>>,
    ) -> Self {
        Self {
            shared: Arc::new(BatchShared {
                id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
                input: Mutex::new(Some(items)),
                transport,
                config,
                snapshot,
                state: Mutex::new(BatchState {
                    phase: OperationPhase::Created,
                    cancel_requested: false,
                    children: Vec::new(),
                    observers: Vec::new(),
                    retained: None,
                }),
            }),
        }
    }

    /// Process-unique batch id, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    fn lock(&self) -> MutexGuard<'_, BatchState<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> OperationPhase {
        self.lock().phase
    }

    /// Number of children dispatched so far.
    #[must_use]
    pub fn dispatched(&self) -> usize {
        self.lock().children.len()
    }

    /// Register an observer for the batch result.
    ///
    /// Fires once when `execute` assembles the outcome, or with
    /// [`NetworkError::Cancelled`] if the batch is cancelled before it ran.
    ///
    /// The outcome owns the caller payloads, so the batch does not keep a
    /// copy of it: an observer registered after `execute` finished is not
    /// called. Register observers before executing.
    pub fn on_complete(&self, observer: impl FnOnce(&CorrelatedBatchResult<T>) + Send + 'static) {
        let mut state = self.lock();
        let phase = state.phase;
        if !phase.is_terminal() {
            state.observers.push(Box::new(observer));
            return;
        }

        let replay = match (&state.retained, self.shared.snapshot) {
            (Some(result), Some(snapshot)) => Some(snapshot(result)),
            _ if phase == OperationPhase::Cancelled && !state.cancel_requested => {
                Some(Err(NetworkError::Cancelled))
            }
            _ => None,
        };
        drop(state);

        match replay {
            Some(result) => observer(&result),
            None => tracing::debug!(
                batch_id = self.shared.id,
                "Observer registered after batch finished"
            ),
        }
    }

    /// Run every child and assemble the outcome.
    ///
    /// # Errors
    ///
    /// - The upstream input's error ([`NetworkError::NoInput`] or the
    ///   failure it carried), before any child is created.
    /// - [`NetworkError::Cancelled`] if the batch was cancelled before it ran.
    /// - [`NetworkError::NoInput`] if the batch already executed; the input is
    ///   consumed by the first call.
    ///
    /// Child failures never fail the batch; they land in
    /// [`Outcome::failures`].
    #[tracing::instrument(skip(self), fields(batch_id = self.shared.id))]
    pub async fn execute(&self) -> CorrelatedBatchResult<T> {
        {
            let mut state = self.lock();
            let phase = state.phase;
            match phase {
                OperationPhase::Created => state.phase = OperationPhase::Executing,
                OperationPhase::Cancelled if state.children.is_empty() => {
                    return Err(NetworkError::Cancelled);
                }
                _ => return Err(NetworkError::NoInput),
            }
        }

        let input = self
            .shared
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let items = match input.map(Upstream::into_result) {
            Some(Ok(items)) => items,
            Some(Err(error)) => {
                tracing::warn!(error = %error, "Batch input unavailable");
                return self.finish(Err(error));
            }
            None => return self.finish(Err(NetworkError::NoInput)),
        };

        if items.is_empty() {
            tracing::debug!("Empty batch, nothing to dispatch");
            return self.finish(Ok(Outcome::empty()));
        }

        let total = items.len();
        let started = Instant::now();
        let aggregator = Arc::new(Aggregator::new(total));
        let barrier = WaitGroup::new(total);
        let semaphore = self
            .shared
            .config
            .max_concurrency()
            .map(|permits| Arc::new(Semaphore::new(permits)));

        tracing::debug!(
            submitted = total,
            max_concurrency = ?self.shared.config.max_concurrency(),
            "Dispatching batch"
        );

        for item in items {
            let (request, payload) = item.into_parts();
            let child = RequestOperation::with_retry_policy(
                request.into(),
                Arc::clone(&self.shared.transport),
                self.shared.config.retry_policy(),
            );

            let slot = ResultSlot::new(payload, Arc::clone(&aggregator), barrier.guard());
            child.on_complete(move |result| slot.fill(result));

            let cancelled = {
                let mut state = self.lock();
                state.children.push(child.clone());
                state.cancel_requested
            };

            if cancelled {
                child.cancel();
                continue;
            }

            let semaphore = semaphore.clone();
            tokio::spawn(async move {
                let guard = CancelOnDrop(child);
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        // Closed semaphore; the guard cancels the child
                        Err(_) => return,
                    },
                    None => None,
                };
                let _ = guard.0.execute().await;
            });
        }

        barrier.wait().await;
        debug_assert_eq!(aggregator.recorded(), total);

        let outcome = aggregator.take();
        let elapsed = started.elapsed();

        tracing::info!(
            submitted = total,
            succeeded = outcome.successes().len(),
            failed = outcome.failures().len(),
            elapsed_ms = elapsed.as_millis(),
            "Batch completed"
        );
        BatchMetrics::record_batch(total, elapsed);

        self.finish(Ok(outcome))
    }

    /// Drive [`execute`](Self::execute) to completion from synchronous code.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context, as
    /// [`Handle::block_on`](tokio::runtime::Handle::block_on) does.
    pub fn execute_blocking(&self, runtime: &tokio::runtime::Handle) -> CorrelatedBatchResult<T> {
        runtime.block_on(self.execute())
    }

    /// Cancel the batch.
    ///
    /// Before `execute`, the batch will never dispatch anything. While
    /// executing, every dispatched child is cancelled and children not yet
    /// dispatched are cancelled as they are created; each of them is
    /// reported as a [`NetworkError::Cancelled`] failure and `execute` still
    /// returns the full outcome. No-op once finished.
    pub fn cancel(&self) {
        let children = {
            let mut state = self.lock();
            let phase = state.phase;
            match phase {
                OperationPhase::Created => {
                    state.phase = OperationPhase::Cancelled;
                    let observers = std::mem::take(&mut state.observers);
                    drop(state);

                    tracing::debug!(batch_id = self.shared.id, "Batch cancelled before execution");
                    let result = Err(NetworkError::Cancelled);
                    for observer in observers {
                        observer(&result);
                    }
                    return;
                }
                OperationPhase::Executing if !state.cancel_requested => {
                    state.cancel_requested = true;
                    state.children.clone()
                }
                _ => return,
            }
        };

        tracing::debug!(
            batch_id = self.shared.id,
            children = children.len(),
            "Batch cancelled, cancelling children"
        );
        for child in children {
            child.cancel();
        }
    }

    fn finish(&self, result: CorrelatedBatchResult<T>) -> CorrelatedBatchResult<T> {
        let observers = {
            let mut state = self.lock();
            state.phase = if state.cancel_requested {
                OperationPhase::Cancelled
            } else {
                OperationPhase::Finished
            };
            state.retained = self.shared.snapshot.map(|snapshot| snapshot(&result));
            std::mem::take(&mut state.observers)
        };

        for observer in observers {
            observer(&result);
        }
        result
    }
}

impl<T> std::fmt::Debug for CorrelatedBatchOperation<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("CorrelatedBatchOperation")
            .field("id", &self.shared.id)
            .field("phase", &state.phase)
            .field("children", &state.children.len())
            .finish_non_exhaustive()
    }
}

/// Batch over plain requests.
///
/// Runs on the same engine as [`CorrelatedBatchOperation`] with a unit
/// payload, which is stripped from the outcome.
#[derive(Clone, Debug)]
pub struct BatchRequestOperation {
    inner: CorrelatedBatchOperation<()>,
}

impl BatchRequestOperation {
    /// Create a batch with the default [`BatchConfig`].
    ///
    /// Requests that fail [`Requestable::to_request`] become children that
    /// finish with [`NetworkError::InvalidRequest`].
    pub fn new<R: Requestable>(requests: Upstream<Vec<R>>, transport: Arc<dyn Transport>) -> Self {
        Self::with_config(requests, transport, BatchConfig::default())
    }

    /// Create a batch with an explicit configuration.
    pub fn with_config<R: Requestable>(
        requests: Upstream<Vec<R>>,
        transport: Arc<dyn Transport>,
        config: BatchConfig,
    ) -> Self {
        let items = requests.map(|requests| {
            requests
                .iter()
                .map(|request| BodyRequest::new(request, ()))
                .collect()
        });

        Self {
            inner: CorrelatedBatchOperation::build(
                items,
                transport,
                config,
                Some(copy_result as Snapshot<()>),
            ),
        }
    }

    /// Process-unique batch id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> OperationPhase {
        self.inner.phase()
    }

    /// Run every request and assemble the outcome.
    ///
    /// # Errors
    ///
    /// See [`CorrelatedBatchOperation::execute`].
    pub async fn execute(&self) -> BatchResult {
        self.inner.execute().await.map(strip_payloads)
    }

    /// Drive [`execute`](Self::execute) from synchronous code.
    ///
    /// # Errors
    ///
    /// See [`CorrelatedBatchOperation::execute`].
    pub fn execute_blocking(&self, runtime: &tokio::runtime::Handle) -> BatchResult {
        runtime.block_on(self.execute())
    }

    /// Register an observer for the batch result.
    ///
    /// Fires once when the batch finishes, or with
    /// [`NetworkError::Cancelled`] if it is cancelled before it ran. The
    /// batch keeps its result, so an observer registered after it finished
    /// fires immediately with that result.
    pub fn on_complete(&self, observer: impl FnOnce(&BatchResult) + Send + 'static) {
        self.inner.on_complete(move |result| {
            let result = result.clone().map(strip_payloads);
            observer(&result);
        });
    }

    /// Cancel the batch and its children.
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

fn copy_result(result: &CorrelatedBatchResult<()>) -> CorrelatedBatchResult<()> {
    result.clone()
}

fn strip_payloads(outcome: CorrelatedOutcome<()>) -> BatchOutcome {
    outcome.map(|((), response)| response, |((), error)| error)
}
