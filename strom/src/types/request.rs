//! Represents a JSON-RPC request

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::types::{ProgressToken, task::{RelatedTaskMetadata, TaskAugmentation, RELATED_TASK_KEY}, JSONRPC_VERSION};

/// A unique identifier for a request, scoped to one outbound direction of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl Default for RequestId {
    #[inline]
    fn default() -> RequestId {
        Self::String("(no id)".into())
    }
}

impl fmt::Display for RequestId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(str) => write!(f, "{str}"),
            RequestId::Number(num) => write!(f, "{num}"),
        }
    }
}

impl From<i64> for RequestId {
    #[inline]
    fn from(num: i64) -> Self {
        Self::Number(num)
    }
}

impl From<&str> for RequestId {
    #[inline]
    fn from(str: &str) -> Self {
        Self::String(str.into())
    }
}

impl From<String> for RequestId {
    #[inline]
    fn from(str: String) -> Self {
        Self::String(str)
    }
}

/// A request in the JSON-RPC protocol; expects exactly one response or error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// JSON-RPC protocol version.
    ///
    /// > Note: always 2.0.
    pub jsonrpc: String,

    /// Request identifier. Must be a string or number and unique within the session.
    pub id: RequestId,

    /// Name of the method to invoke.
    pub method: String,

    /// Optional parameters for the method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Protocol-level metadata piggybacked inside `params` under the `_meta` key.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RequestParamsMeta {
    /// An opaque token echoed back in `notifications/progress`.
    #[serde(rename = "progressToken", skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,

    /// Task augmentation carried in `_meta` (the other accepted placement is
    /// the `task` field of the params themselves).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskAugmentation>,

    /// Correlates a nested request with the task it was issued from.
    #[serde(rename = "io.modelcontextprotocol/related-task", skip_serializing_if = "Option::is_none")]
    pub related_task: Option<RelatedTaskMetadata>,

    /// The server-side request context, injected before handler dispatch.
    #[serde(skip)]
    pub(crate) context: Option<crate::Context>,
}

impl Request {
    /// Creates a new [`Request`]
    #[inline]
    pub fn new(id: RequestId, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Deserializes `params` into a method-specific payload.
    ///
    /// Absent params deserialize as an empty object, so payloads whose fields
    /// are all optional parse successfully.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = match &self.params {
            Some(params) => params.clone(),
            None => Value::Object(Default::default()),
        };
        serde_json::from_value(value)
            .map_err(|err| Error::new(ErrorCode::InvalidParams, err.to_string()))
    }

    /// Returns the `_meta` bag, if present and well-formed.
    pub fn meta(&self) -> Option<RequestParamsMeta> {
        self.params
            .as_ref()
            .and_then(|p| p.get("_meta"))
            .and_then(|m| serde_json::from_value(m.clone()).ok())
    }

    /// Returns the progress token the sender attached, if any.
    #[inline]
    pub fn progress_token(&self) -> Option<ProgressToken> {
        self.meta().and_then(|m| m.progress_token)
    }

    /// Injects a `_meta` entry into `params`, creating the bag as needed.
    pub(crate) fn with_meta_entry(mut self, key: &str, value: Value) -> Self {
        let params = self
            .params
            .get_or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = params {
            let meta = map
                .entry("_meta")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(meta) = meta {
                meta.insert(key.into(), value);
            }
        }
        self
    }

    /// Attaches a progress token under `_meta.progressToken`.
    pub(crate) fn with_progress_token(self, token: &ProgressToken) -> Self {
        match serde_json::to_value(token) {
            Ok(v) => self.with_meta_entry("progressToken", v),
            Err(_) => self,
        }
    }

    /// Tags the request as belonging to a task via `_meta`.
    pub(crate) fn with_related_task(self, task_id: &str) -> Self {
        match serde_json::to_value(RelatedTaskMetadata::from(task_id)) {
            Ok(v) => self.with_meta_entry(RELATED_TASK_KEY, v),
            Err(_) => self,
        }
    }
}

/// An extractor that rebuilds a typed payload from a raw [`Request`].
pub trait FromRequest: Sized {
    fn from_request(req: &Request) -> Result<Self, Error>;
}

impl<T: DeserializeOwned> FromRequest for T {
    #[inline]
    fn from_request(req: &Request) -> Result<Self, Error> {
        req.params()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_parses_params_into_typed_payload() {
        let req = Request::new(1.into(), "tools/call", Some(json!({
            "name": "echo",
            "arguments": { "message": "hi" }
        })));

        let params: crate::types::CallToolRequestParams = req.params().unwrap();
        assert_eq!(params.name, "echo");
    }

    #[test]
    fn it_rejects_malformed_params() {
        let req = Request::new(1.into(), "tools/call", Some(json!({ "name": 42 })));
        let params: Result<crate::types::CallToolRequestParams, _> = req.params();
        assert_eq!(params.unwrap_err().code(), crate::error::ErrorCode::InvalidParams);
    }

    #[test]
    fn it_reads_progress_token_from_meta() {
        let req = Request::new(1.into(), "tools/call", Some(json!({
            "name": "echo",
            "_meta": { "progressToken": "p1" }
        })));

        assert_eq!(req.progress_token(), Some(ProgressToken::String("p1".into())));
    }

    #[test]
    fn it_injects_meta_entries() {
        let req = Request::new(1.into(), "ping", None)
            .with_progress_token(&ProgressToken::Number(7));

        let token = req.params.unwrap()["_meta"]["progressToken"].clone();
        assert_eq!(token, json!(7));
    }

    #[test]
    fn it_tags_related_task() {
        let req = Request::new(1.into(), "elicitation/create", Some(json!({ "message": "?" })))
            .with_related_task("T1");

        let meta = req.meta().unwrap();
        assert_eq!(meta.related_task.unwrap().id, "T1");
    }
}
