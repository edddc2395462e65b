//! Adapter from `async` transports to the callback-style boundary.

use std::sync::Arc;
use tokio::task::AbortHandle;
use volley_core::{AsyncTransport, CancelHandle, Completion, RequestDescriptor, Transport};

/// Runs each call of an [`AsyncTransport`] as its own Tokio task.
///
/// The returned handle aborts the task, which drops the in-flight future and
/// with it the completion callback. Calls must be made from within a Tokio
/// runtime.
pub struct SpawnedTransport<A> {
    inner: Arc<A>,
}

impl<A: AsyncTransport> SpawnedTransport<A> {
    /// Wrap an async transport.
    pub fn new(transport: A) -> Self {
        Self {
            inner: Arc::new(transport),
        }
    }

    /// The wrapped transport.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A> Clone for SpawnedTransport<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AsyncTransport> Transport for SpawnedTransport<A> {
    fn call(&self, request: RequestDescriptor, on_complete: Completion) -> Box<dyn CancelHandle> {
        let transport = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let reply = transport.send(request).await;
            on_complete(reply);
        });
        Box::new(TaskHandle(task.abort_handle()))
    }
}

struct TaskHandle(AbortHandle);

impl CancelHandle for TaskHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}
