//! JSON-RPC error codes used by the protocol

use std::fmt::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::error::Error;

/// Standard JSON-RPC error codes plus the MCP-specific extensions.
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorCode {
    /// The receiver got invalid JSON.
    ParseError = -32700,

    /// The JSON sent is not a valid Request object.
    InvalidRequest = -32600,

    /// The method does not exist / is not available.
    MethodNotFound = -32601,

    /// Invalid method parameter(s).
    InvalidParams = -32602,

    /// Internal JSON-RPC error.
    #[default]
    InternalError = -32603,

    /// The transport closed while the request was in flight.
    ConnectionClosed = -32000,

    /// The request did not complete within its deadline.
    RequestTimeout = -32001,

    /// The resource does not exist / is not available.
    ResourceNotFound = -32002,

    /// One or more URL-mode elicitations must be satisfied before retrying.
    UrlElicitationRequired = -32042,

    /// [Local code] The caller cancelled the request; never put on the wire.
    RequestCancelled = -99999,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code as i32
    }
}

impl TryFrom<i32> for ErrorCode {
    type Error = ();

    #[inline]
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -32700 => Ok(ErrorCode::ParseError),
            -32600 => Ok(ErrorCode::InvalidRequest),
            -32601 => Ok(ErrorCode::MethodNotFound),
            -32602 => Ok(ErrorCode::InvalidParams),
            -32603 => Ok(ErrorCode::InternalError),
            -32000 => Ok(ErrorCode::ConnectionClosed),
            -32001 => Ok(ErrorCode::RequestTimeout),
            -32002 => Ok(ErrorCode::ResourceNotFound),
            -32042 => Ok(ErrorCode::UrlElicitationRequired),
            -99999 => Ok(ErrorCode::RequestCancelled),
            _ => Err(()),
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let code: i32 = (*self).into();
        serializer.serialize_i32(code)
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<ErrorCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        ErrorCode::try_from(value).map_err(|_| {
            serde::de::Error::custom(format!("Invalid error code: {value}"))
        })
    }
}

impl Display for ErrorCode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::ParseError => write!(f, "Parse error"),
            ErrorCode::InvalidRequest => write!(f, "Invalid request"),
            ErrorCode::MethodNotFound => write!(f, "Method not found"),
            ErrorCode::InvalidParams => write!(f, "Invalid parameters"),
            ErrorCode::InternalError => write!(f, "Internal error"),
            ErrorCode::ConnectionClosed => write!(f, "Connection closed"),
            ErrorCode::RequestTimeout => write!(f, "Request timed out"),
            ErrorCode::ResourceNotFound => write!(f, "Resource not found"),
            ErrorCode::UrlElicitationRequired => write!(f, "URL elicitation required"),
            ErrorCode::RequestCancelled => write!(f, "Request cancelled"),
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Error::new(code, code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_converts_to_i32_and_back() {
        let codes = [
            (-32700, ErrorCode::ParseError),
            (-32600, ErrorCode::InvalidRequest),
            (-32601, ErrorCode::MethodNotFound),
            (-32602, ErrorCode::InvalidParams),
            (-32603, ErrorCode::InternalError),
            (-32000, ErrorCode::ConnectionClosed),
            (-32001, ErrorCode::RequestTimeout),
            (-32002, ErrorCode::ResourceNotFound),
            (-32042, ErrorCode::UrlElicitationRequired),
            (-99999, ErrorCode::RequestCancelled),
        ];

        for (code, val) in codes {
            let parsed: ErrorCode = code.try_into().unwrap();
            assert_eq!(parsed, val);

            let int: i32 = val.into();
            assert_eq!(int, code);
        }
    }

    #[test]
    fn it_rejects_unknown_codes() {
        assert!(ErrorCode::try_from(-1).is_err());
        let parsed: Result<ErrorCode, _> = serde_json::from_str("-1");
        assert!(parsed.is_err());
    }

    #[test]
    fn it_serializes_as_plain_integer() {
        let json = serde_json::to_string(&ErrorCode::RequestTimeout).unwrap();
        assert_eq!(json, "-32001");
    }
}
