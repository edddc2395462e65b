//! # Volley Core
//!
//! Core types and boundary traits for issuing network requests as
//! cancellable, retryable units of work.
//!
//! This crate contains no execution logic. It defines the vocabulary shared by
//! the runtime, the transport adapters and callers:
//!
//! ## Core Concepts
//!
//! - **Request**: An immutable [`RequestDescriptor`] produced by a [`Requestable`]
//! - **Transport**: The collaborator that performs I/O and reports a [`RawReply`]
//! - **Result**: A classified [`NetworkResult`], either a [`Response`] or a [`NetworkError`]
//! - **Outcome**: The immutable partition of a batch into successes and failures
//! - **Retry**: An injected [`RetryPolicy`] deciding whether a failed attempt re-executes
//!
//! ## Example
//!
//! ```
//! use volley_core::{RawReply, ResponseMetadata, NetworkError};
//!
//! let reply = RawReply::response(ResponseMetadata::new(404), Some("missing".into()));
//!
//! match reply.classify() {
//!     Err(NetworkError::Server { status, .. }) => assert_eq!(status, 404),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

// Re-export the payload type so downstream crates agree on it
pub use bytes::Bytes;

/// Error taxonomy for request operations
pub mod error;

/// Immutable batch results
pub mod outcome;

/// Request descriptors and the `Requestable` capability
pub mod request;

/// Response metadata and reply classification
pub mod response;

/// Retry-decision capability
pub mod retry;

/// Transport boundary traits
pub mod transport;

/// Explicit upstream input
pub mod upstream;

pub use error::{NetworkError, TransportError, TransportErrorKind};
pub use outcome::{BatchOutcome, CorrelatedOutcome, Outcome};
pub use request::{BodyRequest, Method, RequestDescriptor, RequestError, Requestable};
pub use response::{NetworkResult, RawReply, Response, ResponseMetadata};
pub use retry::{RetryDecision, RetryPolicy};
pub use transport::{AsyncTransport, CancelHandle, Completion, Transport};
pub use upstream::Upstream;
