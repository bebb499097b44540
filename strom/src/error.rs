//! Represents a protocol error

use std::convert::Infallible;
use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use serde_json::Value;

pub use error_code::ErrorCode;

pub mod error_code;

type BoxError = Box<
    dyn StdError
    + Send
    + Sync
>;

/// Represents an MCP error.
///
/// Carries a JSON-RPC error code, a human-readable source and an optional
/// structured `data` payload that is preserved on the wire.
#[derive(Debug)]
pub struct Error {
    pub(crate) code: ErrorCode,
    inner: BoxError,
    data: Option<Value>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Self {
            inner: err.into(),
            code: ErrorCode::ParseError,
            data: None,
        }
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Self {
            inner: err.into(),
            code: ErrorCode::InternalError,
            data: None,
        }
    }
}

impl From<Infallible> for Error {
    fn from(infallible: Infallible) -> Error {
        match infallible {}
    }
}

impl Error {
    /// Creates a new [`Error`]
    #[inline]
    pub fn new(code: impl TryInto<ErrorCode>, err: impl Into<BoxError>) -> Error {
        Self {
            inner: err.into(),
            code: code
                .try_into()
                .unwrap_or_default(),
            data: None,
        }
    }

    /// Attaches a structured `data` payload to the error.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Returns the JSON-RPC error code.
    #[inline]
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Returns the structured `data` payload, if any.
    #[inline]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Whether the code was chosen deliberately at the protocol level.
    ///
    /// Errors that bubble up from application code default to
    /// [`ErrorCode::InternalError`]; a tool callback returning one of those is
    /// reported inside the tool result instead of failing the request.
    #[inline]
    pub(crate) fn is_protocol(&self) -> bool {
        self.code != ErrorCode::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_keeps_the_given_code() {
        let err = Error::new(ErrorCode::InvalidParams, "missing argument");
        assert_eq!(err.code(), ErrorCode::InvalidParams);
        assert_eq!(err.to_string(), "missing argument");
    }

    #[test]
    fn it_falls_back_to_internal_error_for_unknown_codes() {
        let err = Error::new(42, "whatever");
        assert_eq!(err.code(), ErrorCode::InternalError);
    }

    #[test]
    fn it_carries_data() {
        let err = Error::new(ErrorCode::UrlElicitationRequired, "pending elicitations")
            .with_data(serde_json::json!({ "elicitations": [] }));
        assert!(err.data().is_some());
    }
}
