//! Builders for [`RawReply`] values.

use bytes::Bytes;
use volley_core::{RawReply, ResponseMetadata, TransportError, TransportErrorKind};

/// A protocol response with a status and body.
pub fn ok(status: u16, body: impl Into<Bytes>) -> RawReply {
    RawReply::response(ResponseMetadata::new(status), Some(body.into()))
}

/// A protocol response with a status and no body.
#[must_use]
pub fn status(status: u16) -> RawReply {
    RawReply::response(ResponseMetadata::new(status), None)
}

/// A connection failure.
pub fn connect_error(message: impl Into<String>) -> RawReply {
    RawReply::failed(TransportError::connect(message))
}

/// A transport timeout.
#[must_use]
pub fn timeout() -> RawReply {
    RawReply::failed(TransportError::timeout("request timed out"))
}

/// A reply carrying neither metadata nor an error.
#[must_use]
pub fn empty() -> RawReply {
    RawReply::default()
}

/// A transport failure of any kind.
pub fn transport_error(kind: TransportErrorKind, message: impl Into<String>) -> RawReply {
    RawReply::failed(TransportError::new(kind, message))
}
