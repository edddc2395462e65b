//! Single request operation.
//!
//! A [`RequestOperation`] wraps one logical request. It issues the transport
//! call, classifies the raw reply, consults its retry policy on failure and
//! finishes exactly once with a [`NetworkResult`].
//!
//! # Lifecycle
//!
//! ```text
//! Created ──execute──▶ Executing ──reply──▶ Finished
//!    │                   │  ▲
//!    │                   └──┘ retry (previous handle cancelled first)
//!    │                   │
//!    └──────cancel───────┴──────▶ Cancelled
//! ```
//!
//! The finish transition, whether it comes from a transport reply or from
//! [`RequestOperation::cancel`], happens once under the operation's mutex.
//! Whoever loses the race observes the winner's result, so a late reply after
//! a cancellation is a no-op.

use crate::metrics::RequestMetrics;
use crate::retry::NoRetry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use volley_core::{
    CancelHandle, NetworkError, NetworkResult, RawReply, RequestDescriptor, Requestable,
    RetryDecision, RetryPolicy, Transport, TransportError, TransportErrorKind, Upstream,
};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Completion observer registered with [`RequestOperation::on_complete`].
pub type Observer = Box<dyn FnOnce(&NetworkResult) + Send + 'static>;

/// Lifecycle phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationPhase {
    /// Built, not yet executed
    Created,
    /// A transport call (or retry delay) is in progress
    Executing,
    /// Finished with a success or a classified failure
    Finished,
    /// Cancelled; terminal
    Cancelled,
}

impl OperationPhase {
    /// Whether no further transitions can happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

struct OperationState {
    phase: OperationPhase,
    attempts: u32,
    started: Option<Instant>,
    handle: Option<Box<dyn CancelHandle>>,
    result: Option<NetworkResult>,
    observers: Vec<Observer>,
}

struct Shared {
    id: u64,
    request: Upstream<RequestDescriptor>,
    transport: Arc<dyn Transport>,
    retry_policy: Arc<dyn RetryPolicy>,
    state: Mutex<OperationState>,
    finished: watch::Sender<bool>,
}

/// One cancellable, retryable unit wrapping a single transport call.
///
/// Cloning yields another handle to the same operation, so one task can
/// execute it while another cancels it.
///
/// # Example
///
/// ```ignore
/// let operation = RequestOperation::new(
///     Upstream::Ready(RequestDescriptor::get("https://api.example.com/health")),
///     transport,
/// );
///
/// operation.on_complete(|result| tracing::info!(ok = result.is_ok(), "health check done"));
///
/// match operation.execute().await {
///     Ok(response) => println!("status {}", response.status()),
///     Err(error) => println!("failed: {error}"),
/// }
/// ```
#[derive(Clone)]
pub struct RequestOperation {
    shared: Arc<Shared>,
}

impl RequestOperation {
    /// Create an operation that never retries.
    pub fn new(request: Upstream<RequestDescriptor>, transport: Arc<dyn Transport>) -> Self {
        Self::with_retry_policy(request, transport, Arc::new(NoRetry))
    }

    /// Create an operation with a retry policy.
    pub fn with_retry_policy(
        request: Upstream<RequestDescriptor>,
        transport: Arc<dyn Transport>,
        retry_policy: Arc<dyn RetryPolicy>,
    ) -> Self {
        let (finished, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
                request,
                transport,
                retry_policy,
                state: Mutex::new(OperationState {
                    phase: OperationPhase::Created,
                    attempts: 0,
                    started: None,
                    handle: None,
                    result: None,
                    observers: Vec::new(),
                }),
                finished,
            }),
        }
    }

    /// Create an operation from anything [`Requestable`].
    ///
    /// A conversion failure is kept and reported when the operation executes.
    pub fn from_requestable<R: Requestable + ?Sized>(
        requestable: &R,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::new(requestable.to_request().into(), transport)
    }

    /// Process-unique operation id, used in logs.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    fn lock(&self) -> MutexGuard<'_, OperationState> {
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

    /// Number of transport calls issued so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    /// Whether the operation was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.phase() == OperationPhase::Cancelled
    }

    /// Whether the operation reached a terminal phase.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase().is_terminal()
    }

    /// The final result, once there is one.
    #[must_use]
    pub fn result(&self) -> Option<NetworkResult> {
        self.lock().result.clone()
    }

    /// Register a completion observer.
    ///
    /// Observers fire exactly once, on success, failure or cancellation. An
    /// observer registered after the operation finished fires immediately on
    /// the calling thread.
    pub fn on_complete(&self, observer: impl FnOnce(&NetworkResult) + Send + 'static) {
        let mut state = self.lock();
        match state.result.clone() {
            Some(result) if state.phase.is_terminal() => {
                drop(state);
                observer(&result);
            }
            _ => state.observers.push(Box::new(observer)),
        }
    }

    /// Run the operation to completion.
    ///
    /// - A cancelled operation returns [`NetworkError::Cancelled`] without
    ///   touching the transport.
    /// - An operation whose upstream input is missing or failed finishes
    ///   immediately with that error.
    /// - Calling `execute` on an operation that is already running or
    ///   finished does not issue another call; it waits for the single
    ///   final result.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn execute(&self) -> NetworkResult {
        let claimed = {
            let mut state = self.lock();
            let claimed = state.phase == OperationPhase::Created;
            if claimed {
                state.phase = OperationPhase::Executing;
                state.started = Some(Instant::now());
            }
            claimed
        };
        if !claimed {
            return self.wait().await;
        }

        let request = match &self.shared.request {
            Upstream::Ready(request) => request.clone(),
            Upstream::NoInput => return self.finish(Err(NetworkError::NoInput)),
            Upstream::Failed(error) => return self.finish(Err(error.clone())),
        };

        let mut finished = self.shared.finished.subscribe();

        loop {
            let Some(reply) = self.issue(&request) else {
                return self.wait().await;
            };

            let reply = tokio::select! {
                reply = reply => reply,
                () = signalled(&mut finished) => return self.wait().await,
            };

            let error = match Self::classify(reply) {
                Ok(response) => return self.finish(Ok(response)),
                Err(error) => error,
            };

            let attempt = self.attempts();
            match self.shared.retry_policy.decide(attempt, &error) {
                RetryDecision::GiveUp => return self.finish(Err(error)),
                RetryDecision::Retry { delay } => {
                    RequestMetrics::record_retry();
                    tracing::warn!(
                        operation_id = self.shared.id,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Request failed, retrying..."
                    );

                    if !delay.is_zero() {
                        tokio::select! {
                            () = tokio::time::sleep(delay) => {}
                            () = signalled(&mut finished) => return self.wait().await,
                        }
                    }
                }
            }
        }
    }

    /// Run [`execute`](Self::execute) on the Tokio worker pool.
    pub fn spawn(&self) -> JoinHandle<NetworkResult> {
        let operation = self.clone();
        tokio::spawn(async move { operation.execute().await })
    }

    /// Wait for the final result without driving the operation.
    ///
    /// Only returns once some other caller executes or cancels it.
    pub async fn wait(&self) -> NetworkResult {
        let mut finished = self.shared.finished.subscribe();
        signalled(&mut finished).await;
        self.result().unwrap_or(Err(NetworkError::Cancelled))
    }

    /// Cancel the operation.
    ///
    /// Marks the operation cancelled, cancels the active transport handle and
    /// notifies observers with [`NetworkError::Cancelled`]. No-op once the
    /// operation is finished. A reply that arrives afterwards is ignored.
    pub fn cancel(&self) {
        let (handle, observers) = {
            let mut state = self.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = OperationPhase::Cancelled;
            state.result = Some(Err(NetworkError::Cancelled));
            (state.handle.take(), std::mem::take(&mut state.observers))
        };

        tracing::debug!(operation_id = self.shared.id, "Request operation cancelled");

        if let Some(handle) = handle {
            handle.cancel();
        }

        self.complete(observers, &Err(NetworkError::Cancelled), None);
    }

    /// Issue one transport call, cancelling the previous one first.
    ///
    /// Returns `None` if the operation was cancelled around the call.
    fn issue(&self, request: &RequestDescriptor) -> Option<oneshot::Receiver<RawReply>> {
        let (previous, attempt) = {
            let mut state = self.lock();
            if state.phase != OperationPhase::Executing {
                return None;
            }
            state.attempts += 1;
            (state.handle.take(), state.attempts)
        };

        if let Some(previous) = previous {
            previous.cancel();
        }

        tracing::debug!(
            operation_id = self.shared.id,
            attempt,
            method = %request.method(),
            url = request.url(),
            "Issuing transport call"
        );
        RequestMetrics::record_attempt();

        let (tx, rx) = oneshot::channel();
        let handle = self.shared.transport.call(
            request.clone(),
            Box::new(move |reply| {
                // Receiver gone means the operation already moved on
                let _ = tx.send(reply);
            }),
        );

        let mut state = self.lock();
        if state.phase == OperationPhase::Executing {
            state.handle = Some(handle);
            Some(rx)
        } else {
            drop(state);
            handle.cancel();
            None
        }
    }

    fn classify(reply: Result<RawReply, oneshot::error::RecvError>) -> NetworkResult {
        match reply {
            Ok(reply) => reply.classify(),
            Err(_) => Err(NetworkError::Transport(TransportError::new(
                TransportErrorKind::Other,
                "transport dropped the completion callback",
            ))),
        }
    }

    /// Transition to `Finished` unless something else already finished us.
    fn finish(&self, result: NetworkResult) -> NetworkResult {
        let (observers, started) = {
            let mut state = self.lock();
            if state.phase.is_terminal() {
                return state.result.clone().unwrap_or(Err(NetworkError::Cancelled));
            }
            state.phase = OperationPhase::Finished;
            state.result = Some(result.clone());
            // The call completed; nothing left to cancel
            state.handle = None;
            (std::mem::take(&mut state.observers), state.started)
        };

        match &result {
            Ok(response) => tracing::debug!(
                operation_id = self.shared.id,
                status = response.status(),
                "Request operation succeeded"
            ),
            Err(error) => tracing::debug!(
                operation_id = self.shared.id,
                error = %error,
                "Request operation failed"
            ),
        }

        self.complete(observers, &result, started);
        result
    }

    fn complete(&self, observers: Vec<Observer>, result: &NetworkResult, started: Option<Instant>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(error) => error.kind(),
        };
        RequestMetrics::record_finished(outcome, started.map(|at| at.elapsed()));

        for observer in observers {
            observer(result);
        }
        self.shared.finished.send_replace(true);
    }
}

/// Resolves once the operation has finished or been cancelled.
async fn signalled(finished: &mut watch::Receiver<bool>) {
    // The sender lives in `Shared`, which outlives every receiver we hand out
    let _ = finished.wait_for(|done| *done).await;
}

impl std::fmt::Debug for RequestOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RequestOperation")
            .field("id", &self.shared.id)
            .field("phase", &state.phase)
            .field("attempts", &state.attempts)
            .finish_non_exhaustive()
    }
}
