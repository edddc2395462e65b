//! Prometheus metrics for observability and monitoring.
//!
//! This module provides metric collection for the operation layer:
//! - Request operations (attempts, retries, outcomes, latency)
//! - Batch operations (size, latency)
//!
//! Metrics are recorded through the `metrics` facade, so they are no-ops until
//! a recorder is installed. [`MetricsServer`] installs the Prometheus one.
//!
//! # Example
//!
//! ```rust,no_run
//! use volley_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Later, serve `server.render()` from the host application's HTTP endpoint
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics recorder.
///
/// Installs the global recorder and renders the scrape payload. Serving it
/// over HTTP is left to the host application.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server.
    ///
    /// # Arguments
    ///
    /// * `addr` - Address the host application will expose metrics on (used for logging)
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// If a metrics recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .set_buckets_for_metric(
                Matcher::Full("volley_batch_size".to_string()),
                &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!(addr = %self.addr, "Metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Address metrics are meant to be exposed on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if the recorder hasn't been installed by this server.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Request operation metrics
    describe_counter!(
        "volley_request_attempts_total",
        "Total number of transport calls issued by request operations"
    );
    describe_counter!(
        "volley_request_retries_total",
        "Total number of re-executions requested by retry policies"
    );
    describe_counter!(
        "volley_requests_total",
        "Total number of request operations finished, labelled by outcome"
    );
    describe_histogram!(
        "volley_request_duration_seconds",
        "Time from first attempt to final result of a request operation"
    );

    // Batch metrics
    describe_counter!(
        "volley_batches_total",
        "Total number of batch operations finished"
    );
    describe_histogram!("volley_batch_size", "Number of requests per batch");
    describe_histogram!(
        "volley_batch_duration_seconds",
        "Time from fan-out to assembled outcome"
    );
}

/// Request operation metrics recorder.
pub struct RequestMetrics;

impl RequestMetrics {
    /// Record a transport call being issued.
    pub fn record_attempt() {
        counter!("volley_request_attempts_total").increment(1);
    }

    /// Record a retry decision.
    pub fn record_retry() {
        counter!("volley_request_retries_total").increment(1);
    }

    /// Record a finished operation.
    ///
    /// `outcome` is `"success"` or a [`NetworkError::kind`](volley_core::NetworkError::kind) label.
    pub fn record_finished(outcome: &'static str, duration: Option<Duration>) {
        counter!("volley_requests_total", "outcome" => outcome).increment(1);
        if let Some(duration) = duration {
            histogram!("volley_request_duration_seconds").record(duration.as_secs_f64());
        }
    }
}

/// Batch metrics recorder.
pub struct BatchMetrics;

impl BatchMetrics {
    /// Record a finished batch.
    #[allow(clippy::cast_precision_loss)] // batch sizes are far below f64 precision limits
    pub fn record_batch(size: usize, duration: Duration) {
        counter!("volley_batches_total").increment(1);
        histogram!("volley_batch_size").record(size as f64);
        histogram!("volley_batch_duration_seconds").record(duration.as_secs_f64());
    }
}
