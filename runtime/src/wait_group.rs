//! Counting barrier.
//!
//! A [`WaitGroup`] starts at the number of outstanding tasks. Each task calls
//! [`WaitGroup::done`] (or drops a [`DoneGuard`]) once; waiters resume when the
//! count reaches zero. The count is plain observable state, so tests can
//! assert on it directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Counting barrier for fan-in.
///
/// # Example
///
/// ```
/// use volley_runtime::WaitGroup;
///
/// # tokio_test::block_on(async {
/// let group = WaitGroup::new(2);
/// let worker = group.clone();
///
/// tokio::spawn(async move {
///     worker.done();
///     worker.done();
/// });
///
/// group.wait().await;
/// assert!(group.is_done());
/// # });
/// ```
#[derive(Clone)]
pub struct WaitGroup {
    pending: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl WaitGroup {
    /// Create a barrier waiting on `count` completions.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let (notifier, _) = watch::channel(());
        Self {
            pending: Arc::new(AtomicUsize::new(count)),
            notifier: Arc::new(notifier),
        }
    }

    /// Record one completion.
    ///
    /// Extra calls once the count is already zero are ignored.
    pub fn done(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        match previous {
            // Counter reached zero, wake waiters
            Ok(1) => {
                self.notifier.send_replace(());
            }
            Ok(_) => {}
            Err(_) => tracing::warn!("WaitGroup::done called with no pending completions"),
        }
    }

    /// RAII handle that records one completion when dropped.
    #[must_use]
    pub fn guard(&self) -> DoneGuard {
        DoneGuard(self.clone())
    }

    /// Outstanding completions.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether the count has reached zero.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.pending() == 0
    }

    /// Wait until the count reaches zero.
    pub async fn wait(&self) {
        let mut changes = self.notifier.subscribe();
        while self.pending() > 0 {
            if changes.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait with an upper bound.
    ///
    /// # Errors
    ///
    /// Returns the number of completions still outstanding if `timeout`
    /// elapses first.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), usize> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| self.pending())
    }
}

impl std::fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGroup")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Records one completion on its [`WaitGroup`] when dropped.
///
/// Dropping happens on unwinding too, so a panicking task still counts down.
#[derive(Debug)]
pub struct DoneGuard(WaitGroup);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}
