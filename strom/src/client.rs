//! Represents an MCP client

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use self::options::ClientOptions;
use crate::commands;
use crate::error::{Error, ErrorCode};
use crate::session::{
    LocalCapabilities, PeerCapabilities, PeerInfo, RequestOptions, Session, Side,
};
use crate::transport::{Receiver, Transport, TransportReceiver};
use crate::types::{
    elicitation, notification::commands as notifications, root, sampling, CallToolRequestParams,
    CallToolResponse, CompleteRequestParams, CompleteResult, CancelledNotificationParams,
    ElicitationAction, ElicitRequestParams, ErrorResponse, GetPromptRequestParams,
    GetPromptResult, InitializeRequestParams, InitializeResult, ListPromptsRequestParams,
    ListPromptsResult, ListResourcesRequestParams, ListResourcesResult,
    ListResourceTemplatesResult, ListRootsResult, ListToolsRequestParams, ListToolsResult,
    LoggingLevel, LogMessage, Message, Notification, ProgressNotificationParams,
    ReadResourceRequestParams, ReadResourceResult, Reference, Request, Response,
    SetLevelRequestParams, SubscribeRequestParams, Task, TaskSupport,
    cursor::Cursor,
};

pub use tasks::{TasksClient, ToolCallEvent, ToolCallStream};

pub mod options;
pub mod tasks;

/// Represents an MCP client app
pub struct Client {
    /// Configuration until `connect` consumes it.
    options: Option<ClientOptions>,

    /// The live connection.
    runtime: Option<Arc<ClientRuntime>>,
}

/// The connected state shared between the client API and its receive loop.
pub(crate) struct ClientRuntime {
    pub(crate) session: Arc<Session>,
    pub(crate) options: Arc<ClientOptions>,

    /// Output schemas cached from `tools/list`, keyed by tool name.
    output_schemas: DashMap<String, Value>,

    /// Tools whose execution requires task augmentation.
    required_tasks: DashSet<String>,
}

impl Default for Client {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Initializes a new client app
    pub fn new() -> Self {
        Self {
            options: Some(ClientOptions::default()),
            runtime: None,
        }
    }

    /// Configure MCP client options
    pub fn with_options<F>(mut self, config: F) -> Self
    where
        F: FnOnce(ClientOptions) -> ClientOptions,
    {
        self.options = self.options.take().map(config);
        self
    }

    /// Connects to the MCP server and performs the initialize handshake.
    ///
    /// # Example
    /// ```no_run
    /// use strom::{Client, transport::memory};
    /// use strom::error::Error;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Error> {
    ///     let (local, _remote) = memory::duplex();
    ///     let mut client = Client::new()
    ///         .with_options(|opt| opt.with_transport(local));
    ///
    ///     client.connect().await?;
    ///
    ///     // call tools, read resources, etc.
    ///
    ///     client.disconnect().await
    /// }
    /// ```
    pub async fn connect(&mut self) -> Result<(), Error> {
        let mut options = self.options.take().ok_or_else(|| Error::new(
            ErrorCode::InternalError, "Client is already connected"))?;
        let mut transport = options.proto.take().ok_or_else(|| Error::new(
            ErrorCode::InternalError, "Transport protocol must be specified"))?;

        // A present session id means the carrier already negotiated this
        // session; skip the handshake.
        let negotiated = transport.session_id().is_some();
        transport.start()?;
        let (sender, receiver) = transport.split();

        let session = Arc::new(Session::new(
            Side::Client,
            sender,
            options.request_timeout,
            options.strict_capabilities));
        session.set_local_capabilities(
            LocalCapabilities::Client(options.client_capabilities()));

        let runtime = Arc::new(ClientRuntime {
            session,
            options: Arc::new(options),
            output_schemas: DashMap::new(),
            required_tasks: DashSet::new(),
        });
        runtime.clone().start(receiver);
        self.runtime = Some(runtime);

        if negotiated {
            return Ok(());
        }
        self.init().await
    }

    /// Disconnects from the MCP server, failing whatever is still pending.
    pub async fn disconnect(mut self) -> Result<(), Error> {
        if let Some(runtime) = self.runtime.take() {
            runtime.session.close();
        }
        Ok(())
    }

    /// Performs the initialize exchange.
    async fn init(&self) -> Result<(), Error> {
        let rt = self.runtime()?;
        let options = rt.options.clone();

        let params = InitializeRequestParams {
            protocol_ver: options.protocol_ver().into(),
            capabilities: Some(options.client_capabilities()),
            client_info: Some(options.implementation.clone()),
        };

        let outcome = async {
            let result: InitializeResult = rt
                .request_typed(commands::INITIALIZE, params, RequestOptions::default())
                .await?;

            if !crate::PROTOCOL_VERSIONS.contains(&result.protocol_ver.as_str()) {
                return Err(Error::new(
                    ErrorCode::InternalError,
                    format!("Server chose unsupported protocol version: {}", result.protocol_ver)));
            }

            rt.session.set_peer(PeerInfo {
                implementation: Some(result.server_info),
                protocol_version: result.protocol_ver,
                capabilities: PeerCapabilities::Server(result.capabilities),
            });

            rt.session
                .notify(Notification::new(notifications::INITIALIZED, None))
                .await
        }
        .await;

        if outcome.is_err() {
            rt.session.close();
        }
        outcome
    }

    /// Requests a page of the server's tools, refreshing the local caches of
    /// output schemas and required-task tools.
    pub async fn list_tools(&self, cursor: Option<Cursor>) -> Result<ListToolsResult, Error> {
        let rt = self.runtime()?;
        let result: ListToolsResult = rt
            .request_typed(
                crate::types::tool::commands::LIST,
                ListToolsRequestParams { cursor },
                RequestOptions::default())
            .await?;

        for tool in &result.tools {
            match &tool.output_schema {
                Some(schema) => {
                    rt.output_schemas.insert(tool.name.clone(), schema.as_value().clone());
                }
                None => {
                    rt.output_schemas.remove(&tool.name);
                }
            }
            if tool.task_support() == TaskSupport::Required {
                rt.required_tasks.insert(tool.name.clone());
            } else {
                rt.required_tasks.remove(&tool.name);
            }
        }

        Ok(result)
    }

    /// Calls a tool directly.
    ///
    /// Short-circuits for tools known to require task augmentation, and
    /// validates `structuredContent` against the cached output schema.
    ///
    /// # Example
    /// ```no_run
    /// # use strom::{Client, error::Error};
    /// # async fn call(client: &Client) -> Result<(), Error> {
    /// let args = [("message", "Hello MCP!")];
    /// let result = client.call_tool("echo", Some(args)).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call_tool<I, T>(
        &self,
        name: &str,
        args: Option<I>,
    ) -> Result<CallToolResponse, Error>
    where
        I: IntoIterator<Item = (&'static str, T)>,
        T: Serialize,
    {
        self.call_tool_with(name, args, RequestOptions::default()).await
    }

    /// Calls a tool with explicit per-request options (timeout, progress
    /// sink, cancellation).
    pub async fn call_tool_with<I, T>(
        &self,
        name: &str,
        args: Option<I>,
        options: RequestOptions,
    ) -> Result<CallToolResponse, Error>
    where
        I: IntoIterator<Item = (&'static str, T)>,
        T: Serialize,
    {
        let rt = self.runtime()?;
        if rt.required_tasks.contains(name) {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                format!("Tool {name} requires task-augmented execution; use the tasks facade")));
        }

        let params = CallToolRequestParams {
            name: name.into(),
            args: Self::create_args(args),
            task: None,
            meta: None,
        };
        let response: CallToolResponse = rt
            .request_typed(crate::types::tool::commands::CALL, params, options)
            .await?;

        if !response.is_error {
            if let Some(schema) = rt.output_schemas.get(name) {
                let instance = response.struct_content.clone().unwrap_or(Value::Null);
                crate::shared::validate_against_schema(
                    schema.value(), &instance, "structuredContent")?;
            }
        }
        Ok(response)
    }

    /// Requests a page of the server's resources.
    pub async fn list_resources(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<ListResourcesResult, Error> {
        self.runtime()?
            .request_typed(
                crate::types::resource::commands::LIST,
                ListResourcesRequestParams { cursor },
                RequestOptions::default())
            .await
    }

    /// Requests a page of the server's resource templates.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<Cursor>,
    ) -> Result<ListResourceTemplatesResult, Error> {
        self.runtime()?
            .request_typed(
                crate::types::resource::commands::TEMPLATES_LIST,
                ListResourcesRequestParams { cursor },
                RequestOptions::default())
            .await
    }

    /// Reads a resource by URI.
    pub async fn read_resource(&self, uri: impl Into<String>) -> Result<ReadResourceResult, Error> {
        self.runtime()?
            .request_typed(
                crate::types::resource::commands::READ,
                ReadResourceRequestParams::new(uri),
                RequestOptions::default())
            .await
    }

    /// Subscribes to updates of a resource.
    pub async fn subscribe_resource(&self, uri: impl Into<String>) -> Result<(), Error> {
        let _: Value = self.runtime()?
            .request_typed(
                crate::types::resource::commands::SUBSCRIBE,
                SubscribeRequestParams { uri: uri.into() },
                RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Unsubscribes from updates of a resource.
    pub async fn unsubscribe_resource(&self, uri: impl Into<String>) -> Result<(), Error> {
        let _: Value = self.runtime()?
            .request_typed(
                crate::types::resource::commands::UNSUBSCRIBE,
                SubscribeRequestParams { uri: uri.into() },
                RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Requests a page of the server's prompts.
    pub async fn list_prompts(&self, cursor: Option<Cursor>) -> Result<ListPromptsResult, Error> {
        self.runtime()?
            .request_typed(
                crate::types::prompt::commands::LIST,
                ListPromptsRequestParams { cursor },
                RequestOptions::default())
            .await
    }

    /// Renders a prompt.
    pub async fn get_prompt<I, T>(
        &self,
        name: &str,
        args: Option<I>,
    ) -> Result<GetPromptResult, Error>
    where
        I: IntoIterator<Item = (&'static str, T)>,
        T: Serialize,
    {
        self.runtime()?
            .request_typed(
                crate::types::prompt::commands::GET,
                GetPromptRequestParams {
                    name: name.into(),
                    args: Self::create_args(args),
                    meta: None,
                },
                RequestOptions::default())
            .await
    }

    /// Requests completion values for a prompt or template argument.
    pub async fn complete(
        &self,
        reference: Reference,
        argument: &str,
        value: &str,
    ) -> Result<CompleteResult, Error> {
        self.runtime()?
            .request_typed(
                crate::types::completion::commands::COMPLETE,
                CompleteRequestParams {
                    r#ref: reference,
                    argument: crate::types::Argument {
                        name: argument.into(),
                        value: value.into(),
                    },
                },
                RequestOptions::default())
            .await
    }

    /// Sets the minimum severity of log notifications for this session.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<(), Error> {
        let _: Value = self.runtime()?
            .request_typed(
                notifications::SET_LEVEL,
                SetLevelRequestParams { level },
                RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Pings the server.
    pub async fn ping(&self) -> Result<(), Error> {
        let _: Value = self.runtime()?
            .request_typed(commands::PING, json!({}), RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Announces a change to the client's root listing.
    pub async fn send_roots_list_changed(&self) -> Result<(), Error> {
        self.runtime()?
            .session
            .notify(Notification::new(root::commands::LIST_CHANGED, None))
            .await
    }

    /// The task facade: task-augmented tool calls, polling and results.
    pub fn tasks(&self) -> Result<TasksClient, Error> {
        Ok(TasksClient::new(self.runtime()?.clone()))
    }

    /// The server's identity, after the handshake.
    pub fn server_info(&self) -> Option<crate::types::Implementation> {
        self.runtime
            .as_ref()
            .and_then(|rt| rt.session.peer())
            .and_then(|peer| peer.implementation)
    }

    fn runtime(&self) -> Result<&Arc<ClientRuntime>, Error> {
        self.runtime.as_ref().ok_or_else(|| Error::new(
            ErrorCode::ConnectionClosed, "Client is not connected"))
    }

    /// Creates arguments for tools and prompts from an iterator of pairs.
    fn create_args<I, T>(args: Option<I>) -> Option<HashMap<String, Value>>
    where
        I: IntoIterator<Item = (&'static str, T)>,
        T: Serialize,
    {
        args.map(|args| {
            args.into_iter()
                .filter_map(|(k, v)| {
                    serde_json::to_value(v).ok().map(|v| (k.to_string(), v))
                })
                .collect()
        })
    }
}

impl ClientRuntime {
    /// Sends a request and deserializes its result.
    pub(crate) async fn request_typed<P, R>(
        &self,
        method: &str,
        params: P,
        options: RequestOptions,
    ) -> Result<R, Error>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let req = Request::new(
            self.session.next_id(),
            method,
            Some(serde_json::to_value(params)?));
        self.session
            .request(req, options)
            .await?
            .parse()
    }

    /// Spawns the receive loop.
    fn start(self: Arc<Self>, mut receiver: TransportReceiver) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.session.closed().cancelled() => break,
                    msg = receiver.recv() => match msg {
                        Ok(msg) => self.dispatch(msg),
                        Err(_) => {
                            self.session.close();
                            break;
                        }
                    }
                }
            }
        });
    }

    fn dispatch(self: &Arc<Self>, msg: Message) {
        match msg {
            Message::Response(resp) => {
                let id = resp.id.clone();
                self.session.handle_reply(&id, Ok(resp));
            }
            Message::Error(err) => {
                let id = err.id.clone();
                self.session.handle_reply(&id, Err(err.error.into()));
            }
            Message::Request(req) => self.handle_request(req),
            Message::Notification(notification) => self.handle_notification(notification),
        }
    }

    /// Dispatches a reverse request from the server into the configured
    /// callbacks.
    fn handle_request(self: &Arc<Self>, req: Request) {
        let rt = self.clone();
        let id = req.id.clone();
        let token = self.session.inflight.track(&id, self.session.closed());

        tokio::spawn(async move {
            let reply = tokio::select! {
                outcome = rt.serve_request(&req) => Some(match outcome {
                    Ok(value) => Message::Response(Response::success(id.clone(), value)),
                    Err(err) => Message::Error(ErrorResponse::new(id.clone(), err)),
                }),
                _ = token.cancelled() => None,
            };

            rt.session.inflight.complete(&id);
            if let Some(reply) = reply {
                if let Err(err) = rt.session.send_raw(reply).await {
                    tracing::error!(logger = "strom", "Error sending reply: {err}");
                }
            }
        });
    }

    async fn serve_request(&self, req: &Request) -> Result<Value, Error> {
        match req.method.as_str() {
            commands::PING => Ok(json!({})),
            sampling::commands::CREATE => {
                let Some(handler) = &self.options.sampling else {
                    return Err(Error::new(
                        ErrorCode::MethodNotFound, "No sampling handler configured"));
                };
                let result = handler(req.params()?).await?;
                serde_json::to_value(result).map_err(Into::into)
            }
            elicitation::commands::CREATE => {
                let Some(handler) = &self.options.elicitation else {
                    return Err(Error::new(
                        ErrorCode::MethodNotFound, "No elicitation handler configured"));
                };
                let params: ElicitRequestParams = req.params()?;
                let schema = params.schema.clone();
                let mut result = handler(params).await?;

                if self.options.apply_elicitation_defaults
                    && result.action == ElicitationAction::Accept
                {
                    if let (Some(schema), Some(content)) = (schema, result.content.as_mut()) {
                        schema.apply_defaults(content);
                    }
                }
                serde_json::to_value(result).map_err(Into::into)
            }
            root::commands::LIST => {
                let roots = self.options.roots.clone().unwrap_or_default();
                serde_json::to_value(ListRootsResult { roots }).map_err(Into::into)
            }
            method => Err(Error::new(
                ErrorCode::MethodNotFound,
                format!("Unknown method: {method}"))),
        }
    }

    fn handle_notification(&self, notification: Notification) {
        match notification.method.as_str() {
            notifications::PROGRESS => {
                match notification.params::<ProgressNotificationParams>() {
                    Ok(params) => self.session.handle_progress(params),
                    Err(err) => tracing::debug!(
                        logger = "strom", "Malformed progress notification: {err}"),
                }
            }
            notifications::CANCELLED => {
                match notification.params::<CancelledNotificationParams>() {
                    Ok(params) => self.session.handle_cancelled(&params.request_id),
                    Err(err) => tracing::debug!(
                        logger = "strom", "Malformed cancelled notification: {err}"),
                }
            }
            notifications::MESSAGE => {
                if let Ok(log) = notification.params::<LogMessage>() {
                    write_log(log);
                }
            }
            crate::types::task::commands::STATUS => {
                if let Some(handler) = &self.options.task_status {
                    if let Ok(task) = notification.params::<Task>() {
                        handler(task);
                    }
                }
            }
            method => {
                tracing::debug!(logger = "strom", "Unhandled notification: {method}");
            }
        }
    }
}

/// Bridges `notifications/message` into the local `tracing` subscriber.
fn write_log(log: LogMessage) {
    let data = log.data.unwrap_or(Value::Null);
    let level = log.level.as_tracing();
    if level == tracing::Level::DEBUG {
        tracing::debug!(logger = "strom", server_log = %data);
    } else if level == tracing::Level::INFO {
        tracing::info!(logger = "strom", server_log = %data);
    } else if level == tracing::Level::WARN {
        tracing::warn!(logger = "strom", server_log = %data);
    } else {
        tracing::error!(logger = "strom", server_log = %data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_requires_connect_before_use() {
        let client = Client::new();
        let err = client.ping().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionClosed);
    }

    #[test]
    fn it_builds_args_from_pairs() {
        let args = Client::create_args(Some([("a", 1), ("b", 2)])).unwrap();
        assert_eq!(args["a"], json!(1));
        assert_eq!(args["b"], json!(2));
    }

    #[test]
    fn it_builds_no_args_from_none() {
        let args = Client::create_args(None::<[(&'static str, i32); 0]>);
        assert!(args.is_none());
    }
}
