//! # Volley Runtime
//!
//! Execution layer for Volley request operations.
//!
//! This crate turns the boundary types from `volley-core` into running work on
//! the Tokio worker pool.
//!
//! ## Core Components
//!
//! - **`RequestOperation`**: One cancellable, retryable unit wrapping a single transport call
//! - **`BatchRequestOperation`**: Fan-out/fan-in over many requests, partitioned into an `Outcome`
//! - **`CorrelatedBatchOperation`**: The same, with a caller payload attached to every result
//! - **`WaitGroup`**: The counting barrier batches wait on
//! - **`SpawnedTransport`**: Adapts an `async` transport to the callback-style boundary
//!
//! ## Example
//!
//! ```ignore
//! use volley_runtime::{BatchConfig, BatchRequestOperation};
//! use volley_core::{RequestDescriptor, Upstream};
//!
//! let requests = vec![
//!     RequestDescriptor::get("https://api.example.com/items/1"),
//!     RequestDescriptor::get("https://api.example.com/items/2"),
//! ];
//!
//! let batch = BatchRequestOperation::new(Upstream::Ready(requests), transport);
//! let outcome = batch.execute().await?;
//!
//! for error in outcome.failures() {
//!     tracing::warn!(%error, "request failed");
//! }
//! ```

/// Shared result accumulation for batches
mod aggregate;

/// Fan-out/fan-in batch operations
pub mod batch;

/// Batch configuration
pub mod config;

/// Prometheus metrics for observability
pub mod metrics;

/// Single request operation
pub mod operation;

/// Retry policies
pub mod retry;

/// Async transport adapter
pub mod spawned;

/// Counting barrier
pub mod wait_group;

pub use batch::{BatchRequestOperation, CorrelatedBatchOperation};
pub use config::{BatchConfig, BatchSettings, ConfigError};
pub use operation::{OperationPhase, RequestOperation};
pub use retry::{ExponentialBackoff, NoRetry};
pub use spawned::SpawnedTransport;
pub use wait_group::WaitGroup;
