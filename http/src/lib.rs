//! # Volley HTTP
//!
//! [`ReqwestTransport`] performs Volley requests with a `reqwest` client.
//!
//! It implements [`AsyncTransport`]; wrap it in
//! `volley_runtime::SpawnedTransport` to hand it to request operations.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use volley_http::ReqwestTransport;
//! use volley_runtime::{BatchRequestOperation, SpawnedTransport};
//!
//! let http = ReqwestTransport::new().with_timeout(Duration::from_secs(10));
//! let transport = Arc::new(SpawnedTransport::new(http));
//!
//! let batch = BatchRequestOperation::new(Upstream::Ready(requests), transport);
//! let outcome = batch.execute().await?;
//! ```

use reqwest::Client;
use std::time::Duration;
use volley_core::{
    AsyncTransport, Method, RawReply, RequestDescriptor, ResponseMetadata, TransportError,
    TransportErrorKind,
};

/// HTTP transport backed by a shared `reqwest` client.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// Transport with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport using an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Time out every call after `timeout`.
    ///
    /// Applied per request, on top of any timeout the client already has.
    /// Timeouts surface as [`TransportErrorKind::Timeout`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Per-request timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }
}

const fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn map_error(error: &reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Io
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, error.to_string())
}

impl AsyncTransport for ReqwestTransport {
    async fn send(&self, request: RequestDescriptor) -> RawReply {
        let mut builder = self
            .client
            .request(to_reqwest(request.method()), request.url());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = request.url(), error = %e, "HTTP request failed");
                return RawReply::failed(map_error(&e));
            }
        };

        let mut metadata =
            ResponseMetadata::new(response.status().as_u16()).with_url(response.url().as_str());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                metadata = metadata.with_header(name.as_str(), value);
            }
        }

        tracing::debug!(
            url = request.url(),
            status = metadata.status(),
            "HTTP response received"
        );

        match response.bytes().await {
            Ok(body) if body.is_empty() => RawReply::response(metadata, None),
            Ok(body) => RawReply::response(metadata, Some(body)),
            // Status arrived but the body did not; the transport error wins
            Err(e) => RawReply {
                payload: None,
                metadata: Some(metadata),
                error: Some(map_error(&e)),
            },
        }
    }
}
