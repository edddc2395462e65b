//! Response metadata and classification of raw transport replies.

use crate::Bytes;
use crate::error::{NetworkError, TransportError};

/// Protocol-level metadata of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    status: u16,
    headers: Vec<(String, String)>,
    url: Option<String>,
}

impl ResponseMetadata {
    /// Metadata with the given status and no headers.
    #[must_use]
    pub const fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            url: None,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Record the final URL the response came from.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers in the order the transport reported them.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of a header, compared case-insensitively.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Final URL, when the transport reports one.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Status is in the 2xx range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.status, 200..=299)
    }

    /// Status is a valid HTTP status code (100..=599).
    #[must_use]
    pub const fn is_well_formed(&self) -> bool {
        matches!(self.status, 100..=599)
    }
}

/// Successful response: payload plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response body, if the transport produced one
    pub payload: Option<Bytes>,
    /// Response metadata (always a 2xx status)
    pub metadata: ResponseMetadata,
}

impl Response {
    /// Status code of the response.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.metadata.status()
    }
}

/// Classified result of one request.
pub type NetworkResult = Result<Response, NetworkError>;

/// What a transport hands to its completion callback.
///
/// Any combination of fields may be present; [`RawReply::classify`] decides
/// what the combination means.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReply {
    /// Response body
    pub payload: Option<Bytes>,
    /// Protocol-level metadata
    pub metadata: Option<ResponseMetadata>,
    /// Transport failure
    pub error: Option<TransportError>,
}

impl RawReply {
    /// Reply carrying a protocol response.
    #[must_use]
    pub const fn response(metadata: ResponseMetadata, payload: Option<Bytes>) -> Self {
        Self {
            payload,
            metadata: Some(metadata),
            error: None,
        }
    }

    /// Reply carrying only a transport failure.
    #[must_use]
    pub const fn failed(error: TransportError) -> Self {
        Self {
            payload: None,
            metadata: None,
            error: Some(error),
        }
    }

    /// Classify the reply.
    ///
    /// Precedence, first match wins:
    ///
    /// 1. a transport error, whatever else is present
    /// 2. missing or malformed metadata
    /// 3. a non-2xx status, carrying the body and metadata
    /// 4. success
    ///
    /// # Errors
    ///
    /// Returns the [`NetworkError`] the reply represents when it is not a
    /// successful response.
    pub fn classify(self) -> NetworkResult {
        if let Some(error) = self.error {
            return Err(NetworkError::Transport(error));
        }

        let Some(metadata) = self.metadata.filter(ResponseMetadata::is_well_formed) else {
            return Err(NetworkError::UnknownResponse);
        };

        if !metadata.is_success() {
            return Err(NetworkError::Server {
                status: metadata.status(),
                body: self.payload,
                metadata,
            });
        }

        Ok(Response {
            payload: self.payload,
            metadata,
        })
    }
}
