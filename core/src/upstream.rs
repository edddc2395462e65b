//! Explicit upstream input.

use crate::error::NetworkError;

/// Input handed to an operation by whatever produced it.
///
/// Operations consume this when they execute: only [`Upstream::Ready`] ever
/// reaches the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upstream<T> {
    /// A usable value
    Ready(T),
    /// Nothing was supplied
    NoInput,
    /// The producer failed
    Failed(NetworkError),
}

impl<T> Upstream<T> {
    /// Convert into a `Result`, mapping [`Upstream::NoInput`] to
    /// [`NetworkError::NoInput`].
    ///
    /// # Errors
    ///
    /// Returns the upstream failure, or `NoInput` when nothing was supplied.
    pub fn into_result(self) -> Result<T, NetworkError> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::NoInput => Err(NetworkError::NoInput),
            Self::Failed(err) => Err(err),
        }
    }

    /// Transform the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Upstream<U> {
        match self {
            Self::Ready(value) => Upstream::Ready(f(value)),
            Self::NoInput => Upstream::NoInput,
            Self::Failed(err) => Upstream::Failed(err),
        }
    }

    /// Whether a value is present.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl<T, E: Into<NetworkError>> From<Result<T, E>> for Upstream<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Failed(err.into()),
        }
    }
}

impl<T> From<Option<T>> for Upstream<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::NoInput, Self::Ready)
    }
}
