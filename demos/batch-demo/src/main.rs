//! Batch Demo - Fan-out/Fan-in Example
//!
//! Runs a correlated batch and prints how every request ended, followed by
//! the Prometheus metrics it produced.
//!
//! # Running the Example
//!
//! ```bash
//! # Offline, against a scripted transport
//! cargo run -p batch-demo
//!
//! # Against real endpoints
//! cargo run -p batch-demo -- https://example.com https://example.com/missing
//! ```
//!
//! Batch settings come from `VOLLEY_MAX_CONCURRENCY`, `VOLLEY_MAX_RETRIES`,
//! `VOLLEY_RETRY_INITIAL_DELAY_MS` and `VOLLEY_RETRY_MAX_DELAY_MS`.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use volley_core::{BodyRequest, RequestDescriptor, Transport, Upstream};
use volley_http::ReqwestTransport;
use volley_runtime::metrics::MetricsServer;
use volley_runtime::{BatchConfig, CorrelatedBatchOperation, SpawnedTransport};
use volley_testing::{MockTransport, replies};

/// Scripted transport standing in for a flaky inventory service.
fn scripted(urls: &[String]) -> MockTransport {
    let mock = MockTransport::new();
    for (i, url) in urls.iter().enumerate() {
        match i % 4 {
            0 | 1 => mock.push_reply(url.as_str(), replies::ok(200, format!("{{\"sku\":{i}}}"))),
            2 => {
                // Retryable first, then fine
                mock.push_reply(url.as_str(), replies::status(503));
                mock.push_reply(url.as_str(), replies::ok(200, format!("{{\"sku\":{i}}}")));
            }
            _ => mock.push_reply(url.as_str(), replies::ok(404, "unknown sku")),
        }
    }
    mock
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,volley_runtime=debug,batch_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Batch Demo");

    // 2. Install Prometheus recorder
    let mut metrics = MetricsServer::new(([127, 0, 0, 1], 9000).into());
    metrics.start()?;

    // 3. Load configuration
    let mut config = BatchConfig::from_env()?;
    if config.max_concurrency().is_none() {
        config = config.with_max_concurrency(4);
    }
    tracing::info!(?config, "✓ Configuration loaded");

    // 4. Pick a transport
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (urls, transport): (Vec<String>, Arc<dyn Transport>) = if args.is_empty() {
        let urls: Vec<String> = (0..12)
            .map(|i| format!("https://inventory.example.com/skus/{i}"))
            .collect();
        let mock = scripted(&urls);
        // Let the 503s recover when retries are not configured
        if std::env::var("VOLLEY_MAX_RETRIES").is_err() {
            config = config.with_retry_policy(
                volley_runtime::ExponentialBackoff::builder()
                    .max_retries(2)
                    .initial_delay(Duration::from_millis(20))
                    .build(),
            );
        }
        let transport: Arc<dyn Transport> = Arc::new(mock);
        (urls, transport)
    } else {
        let http = ReqwestTransport::new().with_timeout(Duration::from_secs(10));
        let transport: Arc<dyn Transport> = Arc::new(SpawnedTransport::new(http));
        (args, transport)
    };

    // 5. Run the batch, keeping each URL next to its result
    let items = urls
        .iter()
        .map(|url| BodyRequest::new(&RequestDescriptor::get(url.as_str()), url.clone()))
        .collect();
    let batch = CorrelatedBatchOperation::with_config(Upstream::Ready(items), transport, config);

    let outcome = batch.execute().await?;

    // 6. Report
    for (url, response) in outcome.successes() {
        tracing::info!(%url, status = response.status(), "✓ Succeeded");
    }
    for (url, error) in outcome.failures() {
        tracing::warn!(%url, kind = error.kind(), %error, "✗ Failed");
    }
    tracing::info!(
        total = outcome.len(),
        succeeded = outcome.successes().len(),
        failed = outcome.failures().len(),
        "Batch finished"
    );

    // 7. Show the metrics the run produced
    if let Some(rendered) = metrics.render() {
        println!("{rendered}");
    }

    Ok(())
}
