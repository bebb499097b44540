//! Progress token utilities

use std::fmt::Display;
use serde::{Deserialize, Serialize};
use crate::types::RequestId;

/// An opaque scalar chosen by the requester and echoed back in
/// `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    String(String),
    Number(i64),
}

impl Display for ProgressToken {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressToken::String(str) => write!(f, "{str}"),
            ProgressToken::Number(num) => write!(f, "{num}"),
        }
    }
}

impl From<&RequestId> for ProgressToken {
    #[inline]
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::String(str) => Self::String(str.clone()),
            RequestId::Number(num) => Self::Number(*num),
        }
    }
}

impl ProgressToken {
    /// The request id this token was minted from, assuming the SDK convention
    /// of using the request id as the token.
    #[inline]
    pub(crate) fn request_id(&self) -> RequestId {
        match self {
            ProgressToken::String(str) => RequestId::String(str.clone()),
            ProgressToken::Number(num) => RequestId::Number(*num),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_round_trips_through_request_id() {
        let id = RequestId::Number(7);
        let token = ProgressToken::from(&id);
        assert_eq!(token.request_id(), id);
    }

    #[test]
    fn it_serializes_untagged() {
        assert_eq!(serde_json::to_string(&ProgressToken::Number(1)).unwrap(), "1");
        assert_eq!(serde_json::to_string(&ProgressToken::String("p".into())).unwrap(), "\"p\"");
    }
}
