//! Represents an MCP tool

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::handler::{GenericHandler, Handler, HandlerParams, RequestHandler};
use crate::error::{Error, ErrorCode};
use crate::shared::validate_against_schema;
use crate::tasks::TaskSession;
use crate::types::{
    request::RequestParamsMeta,
    task::TaskAugmentation,
    Content, Cursor, Json, Page,
};
use crate::Context;

/// List of commands for tools
pub mod commands {
    pub const LIST: &str = "tools/list";
    pub const CALL: &str = "tools/call";
    pub const LIST_CHANGED: &str = "notifications/tools/list_changed";
}

/// A JSON-Schema subtree describing tool input or output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolSchema(Value);

impl Default for ToolSchema {
    #[inline]
    fn default() -> Self {
        Self::object()
    }
}

impl ToolSchema {
    /// An empty object schema.
    pub fn object() -> Self {
        Self(json!({ "type": "object", "properties": {} }))
    }

    /// Wraps a raw JSON-Schema value.
    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Generates a schema from a type deriving [`schemars::JsonSchema`].
    pub fn of<T: schemars::JsonSchema>() -> Self {
        Self(Json::<T>::schema())
    }

    /// Adds an optional property of the given JSON type.
    pub fn with_property(mut self, name: &str, r#type: &str, descr: &str) -> Self {
        if let Some(props) = self.0
            .as_object_mut()
            .and_then(|o| o.get_mut("properties"))
            .and_then(Value::as_object_mut)
        {
            props.insert(name.into(), json!({ "type": r#type, "description": descr }));
        }
        self
    }

    /// Adds a required property of the given JSON type.
    pub fn with_required_property(mut self, name: &str, r#type: &str, descr: &str) -> Self {
        self = self.with_property(name, r#type, descr);
        if let Some(obj) = self.0.as_object_mut() {
            let required = obj
                .entry("required")
                .or_insert_with(|| Value::Array(vec![]));
            if let Value::Array(required) = required {
                required.push(Value::String(name.into()));
            }
        }
        self
    }

    /// The underlying JSON-Schema value.
    #[inline]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Validates an instance against this schema.
    pub(crate) fn validate(&self, instance: &Value, what: &str) -> Result<(), Error> {
        validate_against_schema(&self.0, instance, what)
    }
}

/// Whether a tool call may, must or must not be run as a task.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    /// The tool only runs as a direct call.
    #[default]
    Forbidden,

    /// The caller chooses between a direct call and a task.
    Optional,

    /// The tool only runs as a task.
    Required,
}

/// Execution hints attached to a tool.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToolExecution {
    /// Task augmentation policy.
    #[serde(rename = "taskSupport", default)]
    pub task_support: TaskSupport,
}

/// Behavior hints for the client.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ToolAnnotations {
    /// A human-readable title for the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// The tool does not modify its environment.
    #[serde(rename = "readOnlyHint", skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,

    /// The tool may perform destructive updates.
    #[serde(rename = "destructiveHint", skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,

    /// Calling the tool repeatedly with the same arguments has no extra effect.
    #[serde(rename = "idempotentHint", skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,

    /// The tool interacts with entities outside its server.
    #[serde(rename = "openWorldHint", skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

use super::enabled_default;

/// A tool the server is capable of calling.
#[derive(Clone, Serialize, Deserialize)]
pub struct Tool {
    /// The unique name of the tool.
    pub name: String,

    /// A human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A human-readable description of the tool.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// The schema of the `arguments` object.
    #[serde(rename = "inputSchema")]
    pub input_schema: ToolSchema,

    /// The schema of `structuredContent` in non-error results, when declared.
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<ToolSchema>,

    /// Behavior hints for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,

    /// Execution hints; absent means task support is forbidden.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,

    /// Excluded from `tools/list` without being deleted when false.
    #[serde(skip, default = "enabled_default")]
    pub(crate) enabled: bool,

    /// The registered callback.
    #[serde(skip)]
    pub(crate) handler: Option<ToolHandlerKind>,
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("execution", &self.execution)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// The two registration paths of a tool.
#[derive(Clone)]
pub(crate) enum ToolHandlerKind {
    /// A direct-call function.
    Plain(RequestHandler<CallToolResponse>),

    /// A task-aware function receiving a [`TaskSession`].
    Task(TaskToolFunc),
}

/// The erased signature of a task-aware tool callback.
pub(crate) type TaskToolFunc = Arc<
    dyn Fn(TaskSession, CallToolRequestParams) -> BoxFuture<'static, Result<CallToolResponse, Error>>
    + Send
    + Sync
>;

/// Parameters of `tools/list`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsRequestParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The response to a `tools/list` request.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Enabled tools in registration order.
    pub tools: Vec<Tool>,

    /// The position to resume from, `None` when this is the last page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl From<Page<Tool>> for ListToolsResult {
    #[inline]
    fn from(page: Page<Tool>) -> Self {
        Self {
            tools: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolRequestParams {
    /// Tool name.
    pub name: String,

    /// Arguments to pass to the tool.
    #[serde(rename = "arguments", skip_serializing_if = "Option::is_none")]
    pub args: Option<HashMap<String, Value>>,

    /// Task augmentation marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskAugmentation>,

    /// Protocol-level metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestParamsMeta>,
}

impl CallToolRequestParams {
    /// Creates call params for the named tool.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            args: None,
            task: None,
            meta: None,
        }
    }

    /// The augmentation marker, accepted from `params.task` or `_meta.task`.
    pub fn augmentation(&self) -> Option<TaskAugmentation> {
        self.task.or_else(|| self.meta.as_ref().and_then(|m| m.task))
    }

    /// The arguments as a JSON object.
    pub(crate) fn args_value(&self) -> Value {
        match &self.args {
            Some(args) => json!(args),
            None => json!({}),
        }
    }

    /// Injects the request [`Context`] into the metadata.
    pub(crate) fn with_context(mut self, ctx: Context) -> Self {
        self.meta.get_or_insert_with(Default::default).context = Some(ctx);
        self
    }
}

/// The server's reply to a `tools/call` request.
///
/// Errors that originate inside the tool are reported with `isError` set,
/// not as protocol-level errors, so the model can see them and self-correct.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CallToolResponse {
    /// Content blocks produced by the tool.
    pub content: Vec<Content>,

    /// A structured result matching the tool's output schema.
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub struct_content: Option<Value>,

    /// Whether the tool call failed.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl CallToolResponse {
    /// Creates a response with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            struct_content: None,
            is_error: false,
        }
    }

    /// Creates a response carrying structured content.
    pub fn json<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                content: vec![Content::text(value.to_string())],
                struct_content: Some(value),
                is_error: false,
            },
            Err(err) => Self::error(err.into()),
        }
    }

    /// Creates a failed response carrying the error text.
    pub fn error(err: Error) -> Self {
        Self {
            content: vec![Content::text(err.to_string())],
            struct_content: None,
            is_error: true,
        }
    }
}

impl From<&str> for CallToolResponse {
    #[inline]
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for CallToolResponse {
    #[inline]
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<()> for CallToolResponse {
    #[inline]
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<Content> for CallToolResponse {
    #[inline]
    fn from(content: Content) -> Self {
        Self {
            content: vec![content],
            struct_content: None,
            is_error: false,
        }
    }
}

impl<T: Serialize> From<Json<T>> for CallToolResponse {
    #[inline]
    fn from(value: Json<T>) -> Self {
        Self::json(value.0)
    }
}

impl<T, E> From<Result<T, E>> for CallToolResponse
where
    T: Into<CallToolResponse>,
    E: Into<Error>,
{
    #[inline]
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(value) => value.into(),
            Err(err) => Self::error(err.into()),
        }
    }
}

macro_rules! impl_display_into_response {
    ($($t:ty),* $(,)?) => {
        $(impl From<$t> for CallToolResponse {
            #[inline]
            fn from(value: $t) -> Self {
                Self::text(value.to_string())
            }
        })*
    };
}

impl_display_into_response! {
    i8, i16, i32, i64, isize,
    u8, u16, u32, u64, usize,
    f32, f64, bool,
}

impl Tool {
    /// Initializes a plain [`Tool`] from a direct-call function.
    pub(crate) fn plain<F, R, Args>(name: &str, handler: F) -> Self
    where
        F: GenericHandler<Args, Output = R>,
        R: Into<CallToolResponse> + Send + 'static,
        Args: TryFrom<CallToolRequestParams, Error = Error> + Send + Sync + 'static,
    {
        Self::with_handler(name, ToolHandlerKind::Plain(ToolFunc::new(handler)))
    }

    /// Initializes a task-aware [`Tool`] with `taskSupport = optional`.
    pub(crate) fn task_aware<F, R, Fut, Args>(name: &str, handler: F) -> Self
    where
        F: Fn(TaskSession, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<CallToolResponse> + Send + 'static,
        Args: TryFrom<CallToolRequestParams, Error = Error> + Send + Sync + 'static,
    {
        let func: TaskToolFunc = Arc::new(move |session, params| {
            let args = Args::try_from(params);
            let fut = args.map(|args| handler(session, args));
            Box::pin(async move {
                match fut {
                    Ok(fut) => fut.await.map(Into::into),
                    Err(err) => Err(err),
                }
            })
        });
        let mut tool = Self::with_handler(name, ToolHandlerKind::Task(func));
        tool.execution = Some(ToolExecution { task_support: TaskSupport::Optional });
        tool
    }

    fn with_handler(name: &str, handler: ToolHandlerKind) -> Self {
        Self {
            name: name.into(),
            title: None,
            descr: None,
            input_schema: ToolSchema::object(),
            output_schema: None,
            annotations: None,
            execution: None,
            enabled: true,
            handler: Some(handler),
        }
    }

    /// The effective task support policy.
    #[inline]
    pub fn task_support(&self) -> TaskSupport {
        self.execution.map(|e| e.task_support).unwrap_or_default()
    }

    /// Invokes the plain callback.
    pub(crate) async fn call(&self, params: CallToolRequestParams) -> Result<CallToolResponse, Error> {
        match &self.handler {
            Some(ToolHandlerKind::Plain(handler)) => {
                handler.call(HandlerParams::Tool(params)).await
            }
            Some(ToolHandlerKind::Task(_)) => Err(Error::new(
                ErrorCode::InternalError,
                "Tool is task-aware and must run through the task path")),
            None => Err(Error::new(ErrorCode::InternalError, "Tool handler not specified")),
        }
    }

    /// The task-aware callback, when registered through that path.
    pub(crate) fn task_handler(&self) -> Option<TaskToolFunc> {
        match &self.handler {
            Some(ToolHandlerKind::Task(func)) => Some(func.clone()),
            _ => None,
        }
    }
}

pub(crate) struct ToolFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: Into<CallToolResponse>,
    Args: TryFrom<CallToolRequestParams, Error = Error>,
{
    func: F,
    _marker: std::marker::PhantomData<Args>,
}

impl<F, R, Args> ToolFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: Into<CallToolResponse>,
    Args: TryFrom<CallToolRequestParams, Error = Error>,
{
    /// Creates a new [`ToolFunc`] wrapped into [`Arc`]
    pub(crate) fn new(func: F) -> Arc<Self> {
        Arc::new(Self { func, _marker: std::marker::PhantomData })
    }
}

impl<F, R, Args> Handler<CallToolResponse> for ToolFunc<F, R, Args>
where
    F: GenericHandler<Args, Output = R>,
    R: Into<CallToolResponse>,
    Args: TryFrom<CallToolRequestParams, Error = Error> + Send + Sync,
{
    #[inline]
    fn call(&self, params: HandlerParams) -> BoxFuture<'_, Result<CallToolResponse, Error>> {
        Box::pin(async move {
            let HandlerParams::Tool(params) = params else {
                return Err(Error::new(ErrorCode::InternalError, "invalid handler parameters"));
            };
            let args = Args::try_from(params)?;
            Ok(self.func
                .call(args)
                .await
                .into())
        })
    }
}

impl<T: DeserializeOwned> TryFrom<CallToolRequestParams> for Json<T> {
    type Error = Error;

    #[inline]
    fn try_from(params: CallToolRequestParams) -> Result<Self, Error> {
        serde_json::from_value(params.args_value())
            .map(Json)
            .map_err(|err| Error::new(ErrorCode::InvalidParams, err.to_string()))
    }
}

impl TryFrom<CallToolRequestParams> for () {
    type Error = Error;

    #[inline]
    fn try_from(_: CallToolRequestParams) -> Result<Self, Error> {
        Ok(())
    }
}

impl<T: DeserializeOwned> TryFrom<CallToolRequestParams> for (Json<T>,) {
    type Error = Error;

    #[inline]
    fn try_from(params: CallToolRequestParams) -> Result<Self, Error> {
        Ok((Json::try_from(params)?,))
    }
}

impl TryFrom<CallToolRequestParams> for (CallToolRequestParams,) {
    type Error = Error;

    #[inline]
    fn try_from(params: CallToolRequestParams) -> Result<Self, Error> {
        Ok((params,))
    }
}

impl<T: DeserializeOwned> TryFrom<CallToolRequestParams> for (Context, Json<T>) {
    type Error = Error;

    #[inline]
    fn try_from(mut params: CallToolRequestParams) -> Result<Self, Error> {
        let ctx = params
            .meta
            .as_mut()
            .and_then(|m| m.context.take())
            .ok_or_else(|| Error::new(ErrorCode::InternalError, "request context not available"))?;
        Ok((ctx, Json::try_from(params)?))
    }
}

impl TryFrom<CallToolRequestParams> for (Context, CallToolRequestParams) {
    type Error = Error;

    #[inline]
    fn try_from(mut params: CallToolRequestParams) -> Result<Self, Error> {
        let ctx = params
            .meta
            .as_mut()
            .and_then(|m| m.context.take())
            .ok_or_else(|| Error::new(ErrorCode::InternalError, "request context not available"))?;
        Ok((ctx, params))
    }
}

crate::types::response::impl_into_response! {
    ListToolsResult,
    CallToolResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_creates_and_calls_tool() {
        #[derive(serde::Deserialize)]
        struct Args { a: i64, b: i64 }

        let tool = Tool::plain("sum", |args: Json<Args>| async move {
            (args.a + args.b).to_string()
        });

        let mut params = CallToolRequestParams::new("sum");
        params.args = Some(HashMap::from([
            ("a".into(), json!(5)),
            ("b".into(), json!(2)),
        ]));

        let resp = tool.call(params).await.unwrap();
        assert_eq!(resp.content[0].as_text(), Some("7"));
        assert!(!resp.is_error);
    }

    #[tokio::test]
    async fn it_rejects_malformed_arguments() {
        #[derive(serde::Deserialize)]
        struct Args { _a: i64 }

        let tool = Tool::plain("x", |_args: Json<Args>| async move { "" });
        let err = tool.call(CallToolRequestParams::new("x")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn it_builds_schemas() {
        let schema = ToolSchema::object()
            .with_required_property("a", "number", "left operand")
            .with_required_property("b", "number", "right operand");

        let value = schema.as_value();
        assert_eq!(value["properties"]["a"]["type"], "number");
        assert_eq!(value["required"], json!(["a", "b"]));
    }

    #[test]
    fn it_validates_arguments_against_schema() {
        let schema = ToolSchema::object()
            .with_required_property("a", "number", "");

        assert!(schema.validate(&json!({ "a": 1 }), "arguments").is_ok());
        assert!(schema.validate(&json!({}), "arguments").is_err());
    }

    #[test]
    fn it_reads_augmentation_from_either_placement() {
        let mut params = CallToolRequestParams::new("t");
        assert!(params.augmentation().is_none());

        params.meta = Some(RequestParamsMeta {
            task: Some(TaskAugmentation { ttl: Some(5) }),
            ..Default::default()
        });
        assert_eq!(params.augmentation().unwrap().ttl, Some(5));

        params.task = Some(TaskAugmentation { ttl: Some(9) });
        assert_eq!(params.augmentation().unwrap().ttl, Some(9));
    }

    #[test]
    fn it_defaults_task_support_to_forbidden() {
        let tool = Tool::plain("t", || async { "" });
        assert_eq!(tool.task_support(), TaskSupport::Forbidden);
    }

    #[test]
    fn it_hides_handler_from_serialization() {
        let tool = Tool::plain("t", || async { "" });
        let json = serde_json::to_value(&tool).unwrap();
        assert!(json.get("handler").is_none());
        assert_eq!(json["name"], "t");
    }

    #[test]
    fn it_converts_results_into_responses() {
        let ok: CallToolResponse = Ok::<_, Error>("fine").into();
        assert!(!ok.is_error);

        let failed: CallToolResponse =
            Err::<&str, _>(Error::new(ErrorCode::InternalError, "boom")).into();
        assert!(failed.is_error);
        assert_eq!(failed.content[0].as_text(), Some("boom"));
    }
}
