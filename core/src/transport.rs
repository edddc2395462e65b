//! Transport boundary.
//!
//! A transport performs the actual network I/O. The operation layer only needs
//! two things from it: a way to start a call that reports back through a
//! one-shot callback, and a handle to cancel that call.
//!
//! Transports built on `async` clients implement [`AsyncTransport`] instead
//! and are adapted to [`Transport`] by the runtime.

use crate::request::RequestDescriptor;
use crate::response::RawReply;
use std::future::Future;
use std::sync::Arc;

/// One-shot completion callback handed to [`Transport::call`].
pub type Completion = Box<dyn FnOnce(RawReply) + Send + 'static>;

/// Handle to an in-flight transport call.
pub trait CancelHandle: Send + Sync {
    /// Cancel the call.
    ///
    /// Must be idempotent and safe to call after the call completed.
    fn cancel(&self);
}

/// Callback-style transport.
///
/// # Contract
///
/// - `on_complete` fires at most once per call, possibly on another thread,
///   possibly before `call` returns.
/// - After [`CancelHandle::cancel`] the transport may still invoke
///   `on_complete`; the caller is responsible for ignoring it.
pub trait Transport: Send + Sync {
    /// Start a call for `request`.
    fn call(&self, request: RequestDescriptor, on_complete: Completion) -> Box<dyn CancelHandle>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn call(&self, request: RequestDescriptor, on_complete: Completion) -> Box<dyn CancelHandle> {
        (**self).call(request, on_complete)
    }
}

/// Future-returning transport.
///
/// Dropping the returned future must abandon the call.
pub trait AsyncTransport: Send + Sync + 'static {
    /// Perform the request and report the raw reply.
    fn send(&self, request: RequestDescriptor) -> impl Future<Output = RawReply> + Send;
}
