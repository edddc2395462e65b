//! # Volley Testing
//!
//! Testing utilities for code built on Volley request operations.
//!
//! This crate provides:
//! - [`MockTransport`]: a scripted, inspectable [`Transport`](volley_core::Transport)
//! - [`replies`]: builders for the raw replies a transport hands back
//! - [`init_tracing`]: opt-in log output for tests
//!
//! ## Example
//!
//! ```ignore
//! use volley_testing::{MockTransport, replies};
//!
//! #[tokio::test]
//! async fn test_partial_failure() {
//!     let transport = MockTransport::new()
//!         .with_reply("https://api.example.com/a", replies::ok(200, "a"))
//!         .with_reply("https://api.example.com/b", replies::status(500));
//!
//!     let batch = BatchRequestOperation::new(requests, Arc::new(transport.clone()));
//!     let outcome = batch.execute().await.unwrap();
//!
//!     assert_eq!(outcome.successes().len(), 1);
//!     assert_eq!(transport.call_count(), 2);
//! }
//! ```

/// Scripted mock transport
pub mod mock;

/// Raw reply builders
pub mod replies;

pub use mock::{MockCall, MockEvent, MockTransport};

/// Install a `fmt` subscriber honouring `RUST_LOG`, once per process.
///
/// Safe to call from every test; later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
