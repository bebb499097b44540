//! Types used by the MCP protocol
//!
//! See the [specification](https://github.com/modelcontextprotocol/specification) for details

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SDK_NAME;

pub use capabilities::{
    ClientCapabilities,
    ClientTasksCapability,
    CompletionsCapability,
    ElicitationCapability,
    LoggingCapability,
    PromptsCapability,
    ResourcesCapability,
    RootsCapability,
    SamplingCapability,
    ServerCapabilities,
    ServerTasksCapability,
    ToolsCapability,
};
pub use completion::{Argument, CompleteRequestParams, CompleteResult, Completion, Reference};
pub use content::{AudioContent, Content, EmbeddedResource, ImageContent, TextContent};
pub use cursor::{Cursor, Page, Pagination};
pub use elicitation::{
    ElicitationAction, ElicitationMode, ElicitRequestParams, ElicitResult, PendingElicitation,
    RequestSchema,
};
pub use helpers::{Json, PropertyType};
pub use notification::{
    CancelledNotificationParams, LoggingLevel, LogMessage, Notification,
    ProgressNotificationParams, SetLevelRequestParams,
};
pub use progress::ProgressToken;
pub use prompt::{
    GetPromptRequestParams, GetPromptResult, ListPromptsRequestParams, ListPromptsResult,
    Prompt, PromptArgument, PromptMessage,
};
pub use request::{FromRequest, Request, RequestId, RequestParamsMeta};
pub use resource::{
    BlobResourceContents, ListResourcesRequestParams, ListResourcesResult,
    ListResourceTemplatesResult, ReadResourceRequestParams, ReadResourceResult, Resource,
    ResourceContents, ResourceTemplate, ResourceUpdatedNotificationParams,
    SubscribeRequestParams, TextResourceContents,
};
pub use response::{ErrorDetails, ErrorResponse, IntoResponse, Response};
pub use root::{ListRootsResult, Root};
pub use sampling::{
    ContextInclusion, CreateMessageRequestParams, CreateMessageResult, ModelHint,
    ModelPreferences, SamplingMessage,
};
pub use schema::Schema;
pub use task::{
    CancelTaskRequestParams, CreateTaskResult, GetTaskRequestParams,
    GetTaskResultRequestParams, ListTasksRequestParams, ListTasksResult, RelatedTaskMetadata,
    Task, TaskAugmentation, TaskStatus,
};
pub use tool::{
    CallToolRequestParams, CallToolResponse, ListToolsRequestParams, ListToolsResult,
    TaskSupport, Tool, ToolAnnotations, ToolExecution, ToolSchema,
};

pub mod capabilities;
pub mod completion;
pub mod content;
pub mod cursor;
pub mod elicitation;
pub mod notification;
pub mod progress;
pub mod prompt;
pub mod request;
pub mod resource;
pub mod response;
pub mod root;
pub mod sampling;
pub mod schema;
pub mod task;
pub mod tool;
pub(crate) mod helpers;

pub(crate) const JSONRPC_VERSION: &str = "2.0";

/// Registration entries default to enabled.
pub(crate) fn enabled_default() -> bool {
    true
}

/// A JSON-RPC message: the tagged sum of the four wire shapes.
///
/// The parse rule follows the variant order: a payload with `method` and `id`
/// is a [`Request`]; with `method` and no `id` a [`Notification`]; with
/// `result` a [`Response`]; with `error` an [`ErrorResponse`]. Anything else
/// fails to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// See [`Request`]
    Request(Request),

    /// See [`Notification`]
    Notification(Notification),

    /// See [`Response`]
    Response(Response),

    /// See [`ErrorResponse`]
    Error(ErrorResponse),
}

impl Message {
    /// Returns `true` if the current message is a [`Request`]
    #[inline]
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Request(_))
    }

    /// Returns `true` if the current message is a [`Response`] or error
    #[inline]
    pub fn is_reply(&self) -> bool {
        matches!(self, Message::Response(_) | Message::Error(_))
    }

    /// Returns `true` if the current message is a [`Notification`]
    #[inline]
    pub fn is_notification(&self) -> bool {
        matches!(self, Message::Notification(_))
    }

    /// Returns the message id, when the shape carries one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Message::Request(req) => Some(&req.id),
            Message::Response(resp) => Some(&resp.id),
            Message::Error(err) => Some(&err.id),
            Message::Notification(_) => None,
        }
    }
}

impl From<Request> for Message {
    #[inline]
    fn from(req: Request) -> Self {
        Self::Request(req)
    }
}

impl From<Response> for Message {
    #[inline]
    fn from(resp: Response) -> Self {
        Self::Response(resp)
    }
}

impl From<ErrorResponse> for Message {
    #[inline]
    fn from(err: ErrorResponse) -> Self {
        Self::Error(err)
    }
}

impl From<Notification> for Message {
    #[inline]
    fn from(notification: Notification) -> Self {
        Self::Notification(notification)
    }
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequestParams {
    /// The protocol version the client wants to use.
    #[serde(rename = "protocolVersion")]
    pub protocol_ver: String,

    /// The client's capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ClientCapabilities>,

    /// Information about the client implementation.
    #[serde(rename = "clientInfo", skip_serializing_if = "Option::is_none")]
    pub client_info: Option<Implementation>,
}

/// The server's reply to an `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// The protocol version the server chose.
    #[serde(rename = "protocolVersion")]
    pub protocol_ver: String,

    /// The server's capabilities.
    pub capabilities: ServerCapabilities,

    /// Information about the server implementation.
    #[serde(rename = "serverInfo")]
    pub server_info: Implementation,

    /// Optional instructions for using the server and its features.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// The name and version of an MCP implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    /// Name of the implementation.
    pub name: String,

    /// Version of the implementation.
    pub version: String,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            name: SDK_NAME.into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// The type of role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user in the conversation.
    User,
    /// The AI in the conversation.
    Assistant,
}

/// Annotations that can be attached to content, informing the client how
/// objects are used or displayed.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Annotations {
    /// Who the intended consumer of this object is.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience: Vec<Role>,

    /// When the object was last modified.
    #[serde(rename = "lastModified", skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    /// How important this data is, 0 (optional) to 1 (required).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f32>,
}

crate::types::response::impl_into_response! {
    InitializeResult,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_parses_requests() {
        let msg: Message = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 1, "method": "ping"
        })).unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.id(), Some(&RequestId::Number(1)));
    }

    #[test]
    fn it_parses_notifications() {
        let msg: Message = serde_json::from_value(json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        })).unwrap();
        assert!(msg.is_notification());
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn it_parses_responses() {
        let msg: Message = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 2, "result": { "ok": true }
        })).unwrap();
        assert!(matches!(msg, Message::Response(_)));
    }

    #[test]
    fn it_parses_errors() {
        let msg: Message = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 2,
            "error": { "code": -32601, "message": "Method not found" }
        })).unwrap();
        assert!(matches!(msg, Message::Error(_)));
    }

    #[test]
    fn it_rejects_other_shapes() {
        let msg: Result<Message, _> = serde_json::from_value(json!({
            "jsonrpc": "2.0", "id": 2
        }));
        assert!(msg.is_err());
    }

    #[test]
    fn it_round_trips_every_shape() {
        let inputs = [
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {} }),
            json!({ "jsonrpc": "2.0", "method": "notifications/progress",
                    "params": { "progressToken": "p", "progress": 0.5 } }),
            json!({ "jsonrpc": "2.0", "id": 1, "result": { "tools": [] } }),
            json!({ "jsonrpc": "2.0", "id": 1,
                    "error": { "code": -32000, "message": "closed" } }),
        ];

        for input in inputs {
            let msg: Message = serde_json::from_value(input.clone()).unwrap();
            let output = serde_json::to_value(&msg).unwrap();
            assert_eq!(input, output);
        }
    }
}
