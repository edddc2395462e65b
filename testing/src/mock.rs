//! Scripted mock transport.
//!
//! [`MockTransport`] answers calls from per-URL reply queues, either inside
//! `call` (immediate mode) or when the test releases them (held mode). Every
//! call, cancellation and completion is recorded so tests can assert on the
//! exact interleaving an operation produced.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use volley_core::{CancelHandle, Completion, RawReply, RequestDescriptor, Transport, TransportError};

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    /// Call id, in issue order starting at 0
    pub id: usize,
    /// Request the call carried
    pub request: RequestDescriptor,
}

/// Something that happened on the mock, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockEvent {
    /// Call issued
    Called(usize),
    /// Handle cancelled (recorded on every `cancel`, including repeats)
    Cancelled(usize),
    /// Completion callback invoked
    Completed(usize),
}

struct CallRecord {
    request: RequestDescriptor,
    cancels: usize,
    completed: bool,
}

impl CallRecord {
    const fn is_live(&self) -> bool {
        self.cancels == 0 && !self.completed
    }
}

struct Parked {
    id: usize,
    reply: RawReply,
    on_complete: Completion,
}

#[derive(Default)]
struct Inner {
    hold: bool,
    script: HashMap<String, VecDeque<RawReply>>,
    default_reply: Option<RawReply>,
    calls: Vec<CallRecord>,
    events: Vec<MockEvent>,
    parked: Vec<Parked>,
    live: usize,
    max_live: usize,
}

impl Inner {
    fn next_reply(&mut self, url: &str) -> RawReply {
        self.script
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .or_else(|| self.default_reply.clone())
            .unwrap_or_else(|| {
                RawReply::failed(TransportError::connect(format!("no reply scripted for {url}")))
            })
    }

    fn mark_completed(&mut self, id: usize) {
        if let Some(record) = self.calls.get_mut(id) {
            if record.is_live() {
                self.live -= 1;
            }
            record.completed = true;
        }
        self.events.push(MockEvent::Completed(id));
    }
}

/// Mock transport for tests.
///
/// Clones share state, so a test can keep one clone for inspection and hand
/// another to the code under test.
///
/// # Example
///
/// ```
/// use volley_core::{RequestDescriptor, Transport};
/// use volley_testing::{MockTransport, replies};
///
/// let mock = MockTransport::held().with_reply("https://example.com/", replies::status(204));
///
/// let (tx, rx) = std::sync::mpsc::channel();
/// let _handle = mock.call(
///     RequestDescriptor::get("https://example.com/"),
///     Box::new(move |reply| tx.send(reply).unwrap()),
/// );
///
/// assert!(rx.try_recv().is_err());
/// assert!(mock.release_next());
/// assert_eq!(rx.try_recv().unwrap().metadata.unwrap().status(), 204);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MockTransport {
    /// Mock that completes every call inside `call`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that parks every call until the test releases it.
    #[must_use]
    pub fn held() -> Self {
        let mock = Self::default();
        mock.lock().hold = true;
        mock
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a reply for `url`. Replies for one URL are served in order.
    #[must_use]
    pub fn with_reply(self, url: impl Into<String>, reply: RawReply) -> Self {
        self.push_reply(url, reply);
        self
    }

    /// Reply for URLs whose queue is empty.
    ///
    /// Without one, such calls fail with a connection error.
    #[must_use]
    pub fn with_default_reply(self, reply: RawReply) -> Self {
        self.lock().default_reply = Some(reply);
        self
    }

    /// Queue a reply for `url` on a shared mock.
    pub fn push_reply(&self, url: impl Into<String>, reply: RawReply) {
        self.lock()
            .script
            .entry(url.into())
            .or_default()
            .push_back(reply);
    }

    /// Number of calls issued.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Every call issued, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock()
            .calls
            .iter()
            .enumerate()
            .map(|(id, record)| MockCall {
                id,
                request: record.request.clone(),
            })
            .collect()
    }

    /// Everything that happened, in order.
    #[must_use]
    pub fn events(&self) -> Vec<MockEvent> {
        self.lock().events.clone()
    }

    /// How many times the handle for call `id` was cancelled.
    #[must_use]
    pub fn cancel_count(&self, id: usize) -> usize {
        self.lock().calls.get(id).map_or(0, |record| record.cancels)
    }

    /// Calls neither completed nor cancelled.
    #[must_use]
    pub fn live(&self) -> usize {
        self.lock().live
    }

    /// Highest number of simultaneously live calls seen.
    #[must_use]
    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }

    /// Parked calls awaiting release (held mode), including cancelled ones.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().parked.len()
    }

    /// Wait until at least `count` calls were issued.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }

    /// Complete the parked call `id`. Returns `false` if it is not parked.
    ///
    /// A cancelled call still completes; the operation must ignore it.
    pub fn release(&self, id: usize) -> bool {
        let parked = {
            let mut inner = self.lock();
            let Some(position) = inner.parked.iter().position(|parked| parked.id == id) else {
                return false;
            };
            let parked = inner.parked.remove(position);
            inner.mark_completed(parked.id);
            parked
        };
        (parked.on_complete)(parked.reply);
        true
    }

    /// Complete the oldest parked call.
    pub fn release_next(&self) -> bool {
        let id = self.lock().parked.first().map(|parked| parked.id);
        id.is_some_and(|id| self.release(id))
    }

    /// Complete every parked call, newest first. Returns how many completed.
    pub fn release_all_reversed(&self) -> usize {
        let ids: Vec<usize> = self.lock().parked.iter().rev().map(|parked| parked.id).collect();
        ids.into_iter().filter(|id| self.release(*id)).count()
    }

    /// Complete every parked call, oldest first. Returns how many completed.
    pub fn release_all(&self) -> usize {
        let ids: Vec<usize> = self.lock().parked.iter().map(|parked| parked.id).collect();
        ids.into_iter().filter(|id| self.release(*id)).count()
    }
}

impl Transport for MockTransport {
    fn call(&self, request: RequestDescriptor, on_complete: Completion) -> Box<dyn CancelHandle> {
        let (id, immediate) = {
            let mut inner = self.lock();
            let id = inner.calls.len();
            let reply = inner.next_reply(request.url());
            inner.calls.push(CallRecord {
                request,
                cancels: 0,
                completed: false,
            });
            inner.events.push(MockEvent::Called(id));
            inner.live += 1;
            inner.max_live = inner.max_live.max(inner.live);

            if inner.hold {
                inner.parked.push(Parked {
                    id,
                    reply,
                    on_complete,
                });
                (id, None)
            } else {
                inner.mark_completed(id);
                (id, Some((reply, on_complete)))
            }
        };
        self.notify.notify_waiters();

        if let Some((reply, on_complete)) = immediate {
            on_complete(reply);
        }

        Box::new(MockHandle {
            id,
            inner: Arc::clone(&self.inner),
        })
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("MockTransport")
            .field("hold", &inner.hold)
            .field("calls", &inner.calls.len())
            .field("live", &inner.live)
            .field("parked", &inner.parked.len())
            .finish_non_exhaustive()
    }
}

struct MockHandle {
    id: usize,
    inner: Arc<Mutex<Inner>>,
}

impl CancelHandle for MockHandle {
    fn cancel(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut went_dead = false;
        if let Some(record) = inner.calls.get_mut(self.id) {
            went_dead = record.is_live();
            record.cancels += 1;
        }
        if went_dead {
            inner.live -= 1;
        }
        inner.events.push(MockEvent::Cancelled(self.id));
    }
}
