//! Request descriptors and the capability that produces them.

use crate::Bytes;
use crate::error::NetworkError;
use thiserror::Error;

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Method {
    /// GET
    #[default]
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// OPTIONS
    Options,
}

impl Method {
    /// Canonical upper-case method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(RequestError::Invalid(format!("unsupported method '{other}'"))),
        }
    }
}

/// Errors raised while turning caller intent into a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// URL is empty or lacks a scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Header name or value is not usable
    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    /// Any other construction failure
    #[error("{0}")]
    Invalid(String),
}

impl From<RequestError> for NetworkError {
    fn from(err: RequestError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

/// Immutable description of one request.
///
/// Construct with one of the method shorthands and refine with the
/// consuming builder methods:
///
/// ```
/// use volley_core::{Method, RequestDescriptor};
///
/// let request = RequestDescriptor::post("https://api.example.com/items")
///     .header("content-type", "application/json")
///     .body(r#"{"name":"widget"}"#);
///
/// assert_eq!(request.method(), Method::Post);
/// assert_eq!(request.header_value("Content-Type"), Some("application/json"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    url: String,
    method: Method,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Create a request with an explicit method.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// All headers in insertion order.
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

    /// Request body, if any.
    #[must_use]
    pub const fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Check that the descriptor can be handed to a transport.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidUrl`] if the URL has no `scheme://` prefix
    /// and [`RequestError::InvalidHeader`] for empty header names or values
    /// containing line breaks.
    pub fn validate(&self) -> Result<(), RequestError> {
        match self.url.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => {}
            _ => return Err(RequestError::InvalidUrl(self.url.clone())),
        }

        for (name, value) in &self.headers {
            if name.trim().is_empty() || value.contains(|c| c == '\r' || c == '\n') {
                return Err(RequestError::InvalidHeader(name.clone()));
            }
        }

        Ok(())
    }
}

/// Capability that turns caller intent into a request.
///
/// Implementations must be pure: the same value always yields the same
/// descriptor (or the same error) and has no side effects.
pub trait Requestable {
    /// Build the request descriptor.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] when the intent cannot be expressed as a
    /// valid request.
    fn to_request(&self) -> Result<RequestDescriptor, RequestError>;
}

impl Requestable for RequestDescriptor {
    fn to_request(&self) -> Result<RequestDescriptor, RequestError> {
        self.validate()?;
        Ok(self.clone())
    }
}

impl<R: Requestable + ?Sized> Requestable for &R {
    fn to_request(&self) -> Result<RequestDescriptor, RequestError> {
        (**self).to_request()
    }
}

/// A request paired with a caller payload.
///
/// The payload travels alongside the request through a correlated batch and
/// comes back attached to that request's result, whatever order the batch
/// completes in.
#[derive(Debug)]
pub struct BodyRequest<T> {
    request: Result<RequestDescriptor, RequestError>,
    payload: T,
}

impl<T> BodyRequest<T> {
    /// Convert `requestable` now and pair the result with `payload`.
    ///
    /// A conversion failure is kept rather than returned so the payload still
    /// reaches the batch outcome, as a failure.
    pub fn new<R: Requestable + ?Sized>(requestable: &R, payload: T) -> Self {
        Self {
            request: requestable.to_request(),
            payload,
        }
    }

    /// The payload paired with this request.
    pub const fn payload(&self) -> &T {
        &self.payload
    }

    /// The converted request, or the conversion error.
    pub const fn request(&self) -> &Result<RequestDescriptor, RequestError> {
        &self.request
    }

    /// Split into request and payload.
    pub fn into_parts(self) -> (Result<RequestDescriptor, RequestError>, T) {
        (self.request, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_is_requestable() {
        let request = RequestDescriptor::get("https://example.com/a").header("accept", "*/*");
        assert_eq!(request.to_request(), Ok(request.clone()));
    }

    #[test]
    fn test_invalid_url_rejected() {
        let request = RequestDescriptor::get("example.com/no-scheme");
        assert!(matches!(request.to_request(), Err(RequestError::InvalidUrl(_))));
    }

    #[test]
    fn test_header_with_newline_rejected() {
        let request = RequestDescriptor::get("https://example.com").header("x-bad", "a\r\nb");
        assert_eq!(
            request.validate(),
            Err(RequestError::InvalidHeader("x-bad".to_string()))
        );
    }

    #[test]
    fn test_method_round_trip_through_str() {
        assert_eq!("patch".parse::<Method>(), Ok(Method::Patch));
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn test_body_request_keeps_conversion_error() {
        let item = BodyRequest::new(&RequestDescriptor::get(""), 7_u32);
        assert_eq!(*item.payload(), 7);
        let (request, payload) = item.into_parts();
        assert!(request.is_err());
        assert_eq!(payload, 7);
    }

    #[test]
    fn test_request_error_converts_to_network_error() {
        let err: NetworkError = RequestError::InvalidUrl("nope".to_string()).into();
        assert_eq!(err, NetworkError::InvalidRequest("Invalid URL: nope".to_string()));
    }
}
