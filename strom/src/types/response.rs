//! Represents JSON-RPC responses and errors

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Error;
use crate::types::{Message, RequestId, JSONRPC_VERSION};

/// A successful response in the JSON-RPC protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// JSON-RPC protocol version.
    ///
    /// > Note: always 2.0.
    pub jsonrpc: String,

    /// Request identifier matching the original request.
    #[serde(default)]
    pub id: RequestId,

    /// The result of the method invocation. `_meta` piggybacks inside it.
    pub result: Value,
}

/// An error response in the JSON-RPC protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// JSON-RPC protocol version.
    pub jsonrpc: String,

    /// Request identifier matching the original request.
    #[serde(default)]
    pub id: RequestId,

    /// Error information.
    pub error: ErrorDetails,
}

/// The `error` member of an error response.
///
/// The code stays a raw integer so that codes this SDK does not know about
/// survive a round trip.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// The error code.
    pub code: i32,

    /// A short human-readable description.
    #[serde(default)]
    pub message: String,

    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Creates a successful response
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        }
    }

    /// Creates an empty successful response
    pub fn empty(id: RequestId) -> Self {
        Self::success(id, json!({}))
    }

    /// Deserializes the result into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, Error> {
        serde_json::from_value(self.result).map_err(Into::into)
    }
}

impl ErrorResponse {
    /// Creates an error response from an [`Error`]
    pub fn new(id: RequestId, error: Error) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: error.into(),
        }
    }
}

impl From<Error> for ErrorDetails {
    fn from(err: Error) -> Self {
        Self {
            code: err.code().into(),
            message: err.to_string(),
            data: err.data().cloned(),
        }
    }
}

impl From<ErrorDetails> for Error {
    fn from(details: ErrorDetails) -> Self {
        let err = Error::new(details.code, details.message);
        match details.data {
            Some(data) => err.with_data(data),
            None => err,
        }
    }
}

/// Converts a handler's output into the message sent back to the peer.
pub trait IntoResponse {
    fn into_response(self, req_id: RequestId) -> Message;
}

impl IntoResponse for () {
    #[inline]
    fn into_response(self, req_id: RequestId) -> Message {
        Message::Response(Response::empty(req_id))
    }
}

impl IntoResponse for Error {
    #[inline]
    fn into_response(self, req_id: RequestId) -> Message {
        Message::Error(ErrorResponse::new(req_id, self))
    }
}

impl IntoResponse for Value {
    #[inline]
    fn into_response(self, req_id: RequestId) -> Message {
        Message::Response(Response::success(req_id, self))
    }
}

impl<T: IntoResponse> IntoResponse for Result<T, Error> {
    #[inline]
    fn into_response(self, req_id: RequestId) -> Message {
        match self {
            Ok(value) => value.into_response(req_id),
            Err(err) => Message::Error(ErrorResponse::new(req_id, err)),
        }
    }
}

impl<L: IntoResponse, R: IntoResponse> IntoResponse for crate::shared::Either<L, R> {
    #[inline]
    fn into_response(self, req_id: RequestId) -> Message {
        match self {
            crate::shared::Either::Left(l) => l.into_response(req_id),
            crate::shared::Either::Right(r) => r.into_response(req_id),
        }
    }
}

/// Implements [`IntoResponse`] by serializing the value as the `result`.
macro_rules! impl_into_response {
    ($($t:ty),* $(,)?) => {
        $(
        impl crate::types::IntoResponse for $t {
            #[inline]
            fn into_response(self, req_id: crate::types::RequestId) -> crate::types::Message {
                match serde_json::to_value(self) {
                    Ok(v) => crate::types::Message::Response(
                        crate::types::Response::success(req_id, v)),
                    Err(err) => crate::types::Message::Error(
                        crate::types::response::ErrorResponse::new(req_id, err.into())),
                }
            }
        }
        )*
    };
}

pub(crate) use impl_into_response;

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::types::RequestId;
    use super::*;

    #[test]
    fn it_serializes_successful_response_with_int_id() {
        let resp = Response::success(
            RequestId::Number(42),
            serde_json::json!({ "key": "test" }));

        let json = serde_json::to_string(&resp).unwrap();

        assert_eq!(json, r#"{"jsonrpc":"2.0","id":42,"result":{"key":"test"}}"#);
    }

    #[test]
    fn it_serializes_error_response_with_string_id() {
        let resp = ErrorResponse::new(
            RequestId::String("id".into()),
            Error::new(-32603, "some error message"));

        let json = serde_json::to_string(&resp).unwrap();

        assert_eq!(json, r#"{"jsonrpc":"2.0","id":"id","error":{"code":-32603,"message":"some error message"}}"#);
    }

    #[test]
    fn it_preserves_unknown_error_codes() {
        let details: ErrorDetails =
            serde_json::from_str(r#"{"code":-32099,"message":"custom"}"#).unwrap();
        let err: Error = details.into();
        // Unknown codes map to the default locally but stay readable.
        assert_eq!(err.to_string(), "custom");
    }
}
