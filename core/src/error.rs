//! Error types for request operations.
//!
//! Every failure a request operation can end in is one of the
//! [`NetworkError`] kinds below. Errors are `Clone`
//! so a single result can be handed to observers and stored in an outcome.

use crate::Bytes;
use crate::response::ResponseMetadata;
use thiserror::Error;

/// Classified failure of a network request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The operation started without a valid request or collection
    #[error("No input supplied to the operation")]
    NoInput,

    /// The request could not be constructed upstream
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The network call failed before a protocol response was obtained
    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),

    /// A protocol response was received but its status indicates failure
    #[error("Server responded with status {status}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Raw response body, if any
        body: Option<Bytes>,
        /// Full response metadata
        metadata: ResponseMetadata,
    },

    /// Response metadata was missing or not interpretable
    #[error("Unknown or malformed response")]
    UnknownResponse,

    /// The operation was cancelled before it finished
    #[error("Operation cancelled")]
    Cancelled,
}

impl NetworkError {
    /// Status code carried by a server error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    ///
    /// Transport failures, request timeouts (408), rate limiting (429) and
    /// server-side errors (5xx) are retryable. Everything else is permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Server { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Self::NoInput | Self::InvalidRequest(_) | Self::UnknownResponse | Self::Cancelled => {
                false
            }
        }
    }

    /// Whether this error is the cancellation outcome.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label used for metrics and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoInput => "no_input",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Transport(_) => "transport",
            Self::Server { .. } => "server",
            Self::UnknownResponse => "unknown_response",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Coarse category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection could not be established
    Connect,
    /// Host name did not resolve
    Dns,
    /// TLS handshake or certificate failure
    Tls,
    /// The transport gave up waiting
    Timeout,
    /// The connection was reset mid-exchange
    Reset,
    /// Other I/O failure while sending or receiving
    Io,
    /// Anything the transport could not categorise
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::Dns => "dns",
            Self::Tls => "tls",
            Self::Timeout => "timeout",
            Self::Reset => "reset",
            Self::Io => "io",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Failure reported by a transport in place of a protocol response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    /// Create a transport error of the given kind.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Connection failure.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Timeout.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    /// The error category.
    #[must_use]
    pub const fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    /// Human-readable description from the transport.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
