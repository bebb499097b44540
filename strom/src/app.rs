//! Represents an MCP server application

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use self::context::{ConnectionHandle, ConnectionState};
use self::handler::{
    FromHandlerParams, GenericHandler, HandlerParams, NotificationHandler, RequestFunc,
    RequestHandler, TypedFunc,
};
use self::options::{McpOptions, RuntimeMcpOptions, DEFAULT_PAGE_SIZE};
use crate::error::{Error, ErrorCode};
use crate::session::{LocalCapabilities, PeerCapabilities, PeerInfo, Session, Side};
use crate::shared::Either;
use crate::transport::{Receiver, Transport, TransportProto};
use crate::types::{
    notification::commands as notifications, CallToolRequestParams, CallToolResponse,
    CancelTaskRequestParams, CancelledNotificationParams, CompleteRequestParams, CompleteResult,
    Completion, CreateTaskResult, ErrorResponse, GetPromptRequestParams, GetPromptResult,
    GetTaskRequestParams, GetTaskResultRequestParams, InitializeRequestParams, InitializeResult,
    IntoResponse, ListPromptsRequestParams, ListPromptsResult, ListResourcesRequestParams,
    ListResourcesResult, ListResourceTemplatesResult, ListTasksRequestParams, ListTasksResult,
    ListToolsRequestParams, ListToolsResult, Message, Notification, Pagination, Prompt,
    PromptArgument, ProgressNotificationParams, ReadResourceRequestParams, ReadResourceResult,
    Request, Resource, ResourceTemplate, SetLevelRequestParams, SubscribeRequestParams, Task,
    TaskAugmentation, TaskSupport, Tool, ToolAnnotations, ToolSchema,
};
use crate::{commands, tasks, TaskSession};

pub use context::Context;

pub mod context;
pub mod handler;
pub mod options;

type MethodHandlers = HashMap<String, RequestHandler<Message>>;
type NotificationHandlers = HashMap<String, NotificationHandler>;

/// Represents an MCP server application
pub struct App {
    options: McpOptions,
    handlers: MethodHandlers,
    notifications: NotificationHandlers,
}

impl Default for App {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// The shared, per-process server state every connection dispatches through.
pub(crate) struct ServerCore {
    pub(crate) options: RuntimeMcpOptions,
    handlers: Arc<MethodHandlers>,
    notifications: Arc<NotificationHandlers>,
}

impl App {
    /// Initializes a new app with the protocol methods wired up.
    pub fn new() -> Self {
        let mut app = Self {
            options: McpOptions::default(),
            handlers: HashMap::new(),
            notifications: HashMap::new(),
        };

        app.map_handler(commands::INITIALIZE, Self::init);
        app.map_handler(commands::PING, Self::ping);

        app.map_handler(crate::types::tool::commands::LIST, Self::tools);
        app.map_handler(crate::types::tool::commands::CALL, Self::tool);

        app.map_handler(crate::types::resource::commands::LIST, Self::resources);
        app.map_handler(crate::types::resource::commands::TEMPLATES_LIST, Self::resource_templates);
        app.map_handler(crate::types::resource::commands::READ, Self::resource);
        app.map_handler(crate::types::resource::commands::SUBSCRIBE, Self::resource_subscribe);
        app.map_handler(crate::types::resource::commands::UNSUBSCRIBE, Self::resource_unsubscribe);

        app.map_handler(crate::types::prompt::commands::LIST, Self::prompts);
        app.map_handler(crate::types::prompt::commands::GET, Self::prompt);

        app.map_handler(crate::types::completion::commands::COMPLETE, Self::completion);
        app.map_handler(notifications::SET_LEVEL, Self::set_log_level);

        app.map_handler(crate::types::task::commands::LIST, Self::tasks_list);
        app.map_handler(crate::types::task::commands::GET, Self::tasks_get);
        app.map_handler(crate::types::task::commands::CANCEL, Self::tasks_cancel);
        app.map_handler(crate::types::task::commands::RESULT, Self::tasks_result);

        app
    }

    /// Configure MCP server options
    pub fn with_options<F>(mut self, config: F) -> Self
    where
        F: FnOnce(McpOptions) -> McpOptions,
    {
        self.options = config(self.options);
        self
    }

    /// Maps an MCP request to a specific function.
    pub fn map_handler<F, R, Args>(&mut self, name: &str, handler: F) -> &mut Self
    where
        F: GenericHandler<Args, Output = R>,
        R: IntoResponse + Send + 'static,
        Args: FromHandlerParams + Send + Sync + 'static,
    {
        let handler: RequestHandler<Message> = RequestFunc::new(handler);
        self.handlers.insert(name.into(), handler);
        self
    }

    /// Maps a notification to a specific function.
    pub fn map_notification<F, Fut>(&mut self, method: &str, handler: F) -> &mut Self
    where
        F: Fn(Context, Notification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationHandler =
            Arc::new(move |ctx, n| Box::pin(handler(ctx, n)) as BoxFuture<'static, ()>);
        self.notifications.insert(method.into(), handler);
        self
    }

    /// Registers a direct-call tool.
    ///
    /// # Example
    /// ```no_run
    /// use strom::{App, types::Json};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let mut app = App::new();
    ///
    /// #[derive(serde::Deserialize)]
    /// struct Args { name: String }
    ///
    /// app.map_tool("hello", |args: Json<Args>| async move {
    ///     format!("Hello, {}!", args.name)
    /// });
    ///
    /// # app.run().await;
    /// # }
    /// ```
    ///
    /// # Panics
    /// Panics when a tool with the same name is already registered.
    pub fn map_tool<F, R, Args>(&mut self, name: &str, handler: F) -> ToolRegistration<'_>
    where
        F: GenericHandler<Args, Output = R>,
        R: Into<CallToolResponse> + Send + 'static,
        Args: TryFrom<CallToolRequestParams, Error = Error> + Send + Sync + 'static,
    {
        self.options
            .add_tool(Tool::plain(name, handler))
            .unwrap_or_else(|err| panic!("{err}"));
        ToolRegistration { options: &self.options, name: name.into() }
    }

    /// Registers a task-aware tool with `taskSupport = optional`.
    ///
    /// The handler receives a [`TaskSession`] for nested elicitation and
    /// sampling; chain [`ToolRegistration::with_required_task`] to demand
    /// augmented calls.
    ///
    /// # Panics
    /// Panics when a tool with the same name is already registered.
    pub fn map_task_tool<F, R, Fut, Args>(&mut self, name: &str, handler: F) -> ToolRegistration<'_>
    where
        F: Fn(TaskSession, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
        R: Into<CallToolResponse> + Send + 'static,
        Args: TryFrom<CallToolRequestParams, Error = Error> + Send + Sync + 'static,
    {
        self.options
            .add_tool(Tool::task_aware(name, handler))
            .unwrap_or_else(|err| panic!("{err}"));
        ToolRegistration { options: &self.options, name: name.into() }
    }

    /// Registers a static resource.
    ///
    /// # Panics
    /// Panics when a resource with the same URI is already registered.
    pub fn add_resource(&mut self, uri: &str, name: &str) -> ResourceRegistration<'_> {
        self.options
            .add_resource(Resource::new(uri, name))
            .unwrap_or_else(|err| panic!("{err}"));
        ResourceRegistration { options: &self.options, uri: uri.into() }
    }

    /// Registers a resource template with its read callback.
    ///
    /// # Example
    /// ```no_run
    /// use strom::{App, types::ReadResourceRequestParams};
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let mut app = App::new();
    ///
    /// app.map_resource("res://{name}", "read_resource", |params: ReadResourceRequestParams| async move {
    ///     let name = params.vars["name"].clone();
    ///     (params.uri, format!("Resource: {name} content"))
    /// });
    ///
    /// # app.run().await;
    /// # }
    /// ```
    ///
    /// # Panics
    /// Panics when a template with the same name is already registered.
    pub fn map_resource<F, R, Args>(
        &mut self,
        uri_template: &str,
        name: &str,
        handler: F,
    ) -> TemplateRegistration<'_>
    where
        F: GenericHandler<Args, Output = R>,
        R: TryInto<ReadResourceResult> + Send + 'static,
        R::Error: Into<Error>,
        Args: FromHandlerParams + Send + Sync + 'static,
    {
        let mut template = ResourceTemplate::new(uri_template, name);
        template.handler = Some(TypedFunc::new(handler));
        self.options
            .add_template(template)
            .unwrap_or_else(|err| panic!("{err}"));
        TemplateRegistration { options: &self.options, name: name.into() }
    }

    /// Registers a prompt with its render callback.
    ///
    /// # Panics
    /// Panics when a prompt with the same name is already registered.
    pub fn map_prompt<F, R, Args>(&mut self, name: &str, handler: F) -> PromptRegistration<'_>
    where
        F: GenericHandler<Args, Output = R>,
        R: TryInto<GetPromptResult> + Send + 'static,
        R::Error: Into<Error>,
        Args: FromHandlerParams + Send + Sync + 'static,
    {
        let prompt = Prompt {
            name: name.into(),
            title: None,
            descr: None,
            args: None,
            enabled: true,
            handler: Some(TypedFunc::new(handler)),
            complete: HashMap::new(),
        };
        self.options
            .add_prompt(prompt)
            .unwrap_or_else(|err| panic!("{err}"));
        PromptRegistration { options: &self.options, name: name.into() }
    }

    /// Runs the MCP server, logging a fatal error instead of returning it.
    pub async fn run(self) {
        if let Err(err) = self.try_run().await {
            tracing::error!(logger = "strom", "Server stopped: {err}");
        }
    }

    /// Runs the MCP server on the configured transport.
    pub async fn try_run(mut self) -> Result<(), Error> {
        let proto = self.options.proto.take();
        let http = self.options.http.take();
        let core = Arc::new(self.into_core());

        match (http, proto) {
            (Some(http), _) => crate::transport::http::serve(core, http).await,
            (None, Some(proto)) => core.serve(proto).await,
            (None, None) => Err(Error::new(
                ErrorCode::InternalError,
                "Transport protocol must be specified")),
        }
    }

    /// Serves one connection on the given transport.
    pub async fn serve(mut self, transport: impl Into<TransportProto>) -> Result<(), Error> {
        self.options.proto.take();
        self.options.http.take();
        let core = Arc::new(self.into_core());
        core.serve(transport.into()).await
    }

    /// Builds the axum router serving this app over streamable HTTP, for
    /// embedding into an existing server.
    pub fn into_streamable_http_router(mut self) -> axum::Router {
        let http = self.options.http.take().unwrap_or_default();
        self.options.proto.take();
        let core = Arc::new(self.into_core());
        crate::transport::http::router(core, http)
    }

    fn into_core(self) -> ServerCore {
        ServerCore {
            options: self.options.into(),
            handlers: Arc::new(self.handlers),
            notifications: Arc::new(self.notifications),
        }
    }

    /// Connection initialization handler
    async fn init(
        ctx: Context,
        params: InitializeRequestParams,
    ) -> Result<InitializeResult, Error> {
        let options = ctx.options();
        let protocol_ver = if options.supports_version(&params.protocol_ver) {
            params.protocol_ver.clone()
        } else {
            options.protocol_ver().to_string()
        };

        ctx.session.set_peer(PeerInfo {
            implementation: params.client_info.clone(),
            protocol_version: protocol_ver.clone(),
            capabilities: PeerCapabilities::Client(
                params.capabilities.clone().unwrap_or_default()),
        });

        let capabilities = options.server_capabilities();
        ctx.session
            .set_local_capabilities(LocalCapabilities::Server(capabilities.clone()));

        Ok(InitializeResult {
            protocol_ver,
            capabilities,
            server_info: options.implementation.clone(),
            instructions: options.instructions.clone(),
        })
    }

    /// Ping request handler
    async fn ping() {}

    /// Tools listing handler
    async fn tools(
        options: RuntimeMcpOptions,
        params: ListToolsRequestParams,
    ) -> ListToolsResult {
        options.tools_page(params.cursor).into()
    }

    /// Tool call handler: validates arguments, then branches on the tool's
    /// task policy and the caller's augmentation marker.
    async fn tool(
        ctx: Context,
        params: CallToolRequestParams,
    ) -> Result<Either<CreateTaskResult, CallToolResponse>, Error> {
        let options = ctx.options();
        let Some(tool) = options.tool(&params.name) else {
            return Err(Error::new(
                ErrorCode::InvalidParams,
                format!("Unknown tool: {}", params.name)));
        };

        tool.input_schema.validate(&params.args_value(), "arguments")?;

        match (tool.task_support(), params.augmentation()) {
            (TaskSupport::Forbidden, Some(_)) => Err(Error::new(
                ErrorCode::InvalidParams,
                format!("Tool {} does not support task execution", params.name))),
            (TaskSupport::Required, None) => Err(Error::new(
                ErrorCode::MethodNotFound,
                format!("Tool {} requires task-augmented execution", params.name))),
            (TaskSupport::Required | TaskSupport::Optional, Some(augmentation)) => {
                let task = tasks::spawn(&tool, &ctx, params, augmentation, true)?;
                Ok(Either::Left(CreateTaskResult::new(task)))
            }
            (TaskSupport::Optional, None) => {
                let task = tasks::spawn(
                    &tool, &ctx, params, TaskAugmentation::default(), false)?;
                let terminal = ctx.state.tasks.wait_terminal(&task.id).await?;
                match terminal.status {
                    crate::types::TaskStatus::Completed => {
                        let value = ctx.state.tasks.get_result(&task.id)?;
                        Ok(Either::Right(serde_json::from_value(value)?))
                    }
                    crate::types::TaskStatus::Cancelled => Err(Error::new(
                        ErrorCode::InvalidRequest,
                        terminal.status_msg.unwrap_or_else(|| "Task was cancelled".into()))),
                    // Failed: rethrow with the code the failure was stored
                    // under (schema violations stay invalid-params).
                    _ => Err(ctx.state.tasks.failure(&task.id).unwrap_or_else(|| Error::new(
                        ErrorCode::InternalError,
                        terminal.status_msg.unwrap_or_else(|| "Task failed".into())))),
                }
            }
            (TaskSupport::Forbidden, None) => {
                let output_schema = tool.output_schema.clone();
                let response = match tool.call(params.with_context(ctx.clone())).await {
                    Ok(response) => response,
                    Err(err) if err.is_protocol() => return Err(err),
                    Err(err) => CallToolResponse::error(err),
                };

                if let (Some(schema), false) = (&output_schema, response.is_error) {
                    let instance = response
                        .struct_content
                        .clone()
                        .unwrap_or(Value::Null);
                    schema.validate(&instance, "structuredContent")?;
                }
                Ok(Either::Right(response))
            }
        }
    }

    /// Resources listing handler: static entries plus template-provided
    /// ones, template metadata filling in missing fields.
    async fn resources(
        ctx: Context,
        params: ListResourcesRequestParams,
    ) -> Result<ListResourcesResult, Error> {
        let options = ctx.options();
        let mut all = options.static_resources();

        for template in options.resource_templates() {
            let Some(list) = &template.list else { continue };
            for mut resource in list().await? {
                if resource.mime_type.is_none() {
                    resource.mime_type = template.mime_type.clone();
                }
                if resource.descr.is_none() {
                    resource.descr = template.descr.clone();
                }
                all.push(resource);
            }
        }

        Ok(all.paginate(params.cursor, DEFAULT_PAGE_SIZE).into())
    }

    /// Resource templates listing handler
    async fn resource_templates(
        options: RuntimeMcpOptions,
        params: ListResourcesRequestParams,
    ) -> ListResourceTemplatesResult {
        options.templates_page(params.cursor).into()
    }

    /// Resource read handler: exact URI match first, then templates in
    /// registration order.
    async fn resource(
        ctx: Context,
        params: ReadResourceRequestParams,
    ) -> Result<ReadResourceResult, Error> {
        let options = ctx.options();

        if let Some(resource) = options.resource(&params.uri) {
            return match &resource.handler {
                Some(handler) => handler.call(HandlerParams::Resource(ctx.clone(), params)).await,
                None => Err(Error::new(
                    ErrorCode::ResourceNotFound,
                    format!("Resource {} has no read handler", params.uri))),
            };
        }

        for template in options.resource_templates() {
            let Some(vars) = template.matches(&params.uri) else { continue };
            let Some(handler) = &template.handler else { continue };

            let mut params = params;
            params.vars = vars;
            return handler.call(HandlerParams::Resource(ctx.clone(), params)).await;
        }

        Err(Error::from(ErrorCode::ResourceNotFound))
    }

    /// Resource subscription handler
    async fn resource_subscribe(
        ctx: Context,
        params: SubscribeRequestParams,
    ) -> Result<(), Error> {
        ctx.state.subscriptions.insert(params.uri);
        Ok(())
    }

    /// Resource unsubscription handler
    async fn resource_unsubscribe(
        ctx: Context,
        params: SubscribeRequestParams,
    ) -> Result<(), Error> {
        ctx.state.subscriptions.remove(&params.uri);
        Ok(())
    }

    /// Prompts listing handler
    async fn prompts(
        options: RuntimeMcpOptions,
        params: ListPromptsRequestParams,
    ) -> ListPromptsResult {
        options.prompts_page(params.cursor).into()
    }

    /// Prompt render handler with per-argument validation.
    async fn prompt(
        ctx: Context,
        params: GetPromptRequestParams,
    ) -> Result<GetPromptResult, Error> {
        let options = ctx.options();
        let Some(prompt) = options.prompt(&params.name) else {
            return Err(Error::new(
                ErrorCode::InvalidParams,
                format!("Unknown prompt: {}", params.name)));
        };

        prompt.validate_args(params.args.as_ref())?;

        match &prompt.handler {
            Some(handler) => handler.call(HandlerParams::Prompt(ctx.clone(), params)).await,
            None => Err(Error::new(ErrorCode::InternalError, "Prompt handler not specified")),
        }
    }

    /// Completion handler: routes on the reference type.
    async fn completion(
        ctx: Context,
        params: CompleteRequestParams,
    ) -> Result<CompleteResult, Error> {
        let options = ctx.options();
        let argument = params.argument;

        let values = match params.r#ref.r#type.as_str() {
            "ref/prompt" => {
                let name = params.r#ref.name.ok_or_else(|| Error::new(
                    ErrorCode::InvalidParams, "Missing prompt name in reference"))?;
                let prompt = options.prompt(&name).ok_or_else(|| Error::new(
                    ErrorCode::InvalidParams, format!("Unknown prompt: {name}")))?;
                match prompt.complete.get(&argument.name) {
                    Some(complete) => complete(argument.value).await,
                    None => Vec::new(),
                }
            }
            "ref/resource" => {
                let uri = params.r#ref.uri.ok_or_else(|| Error::new(
                    ErrorCode::InvalidParams, "Missing URI in reference"))?;
                let template = options
                    .resource_templates()
                    .into_iter()
                    .find(|t| t.uri_template == uri)
                    .ok_or_else(|| Error::new(
                        ErrorCode::InvalidParams,
                        format!("Unknown resource template: {uri}")))?;
                match template.complete.get(&argument.name) {
                    Some(complete) => complete(argument.value).await,
                    None => Vec::new(),
                }
            }
            other => {
                return Err(Error::new(
                    ErrorCode::InvalidParams,
                    format!("Unknown reference type: {other}")));
            }
        };

        Ok(Completion::of(values).into())
    }

    /// Sets the per-session minimum log severity.
    async fn set_log_level(
        ctx: Context,
        params: SetLevelRequestParams,
    ) -> Result<(), Error> {
        let previous = ctx.state.log_level
            .write().expect("log level lock")
            .replace(params.level);
        tracing::debug!(
            logger = "strom",
            "Logging level changed from {previous:?} to {:?}", params.level);
        Ok(())
    }

    /// Tasks listing handler
    async fn tasks_list(
        ctx: Context,
        params: ListTasksRequestParams,
    ) -> ListTasksResult {
        ctx.state.tasks.list(params.cursor).into()
    }

    /// Task status handler
    async fn tasks_get(
        ctx: Context,
        params: GetTaskRequestParams,
    ) -> Result<Task, Error> {
        ctx.state.tasks.get(&params.id)
    }

    /// Task cancellation handler; safe at any non-terminal point and
    /// idempotent on terminal tasks.
    async fn tasks_cancel(
        ctx: Context,
        params: CancelTaskRequestParams,
    ) -> Result<Task, Error> {
        match ctx.state.tasks.cancel(&params.id, Some("Cancelled by request".into())) {
            Some(task) => {
                tasks::notify_status(&ctx, &task).await;
                Ok(task)
            }
            // Already terminal (or unknown): report the current state.
            None => ctx.state.tasks.get(&params.id),
        }
    }

    /// The blocking task result handler.
    async fn tasks_result(
        ctx: Context,
        params: GetTaskResultRequestParams,
    ) -> Result<Value, Error> {
        tasks::result::serve(&ctx, &params.id).await
    }
}

impl ServerCore {
    /// Serves one connection until its transport closes.
    pub(crate) async fn serve(self: Arc<Self>, mut transport: TransportProto) -> Result<(), Error> {
        let session_id = transport.session_id().unwrap_or_else(Uuid::new_v4);
        transport.start()?;
        let (sender, mut receiver) = transport.split();

        let session = Arc::new(Session::new(
            Side::Server,
            sender,
            self.options.request_timeout,
            self.options.strict_capabilities));
        session.set_local_capabilities(
            LocalCapabilities::Server(self.options.server_capabilities()));

        let state = Arc::new(ConnectionState::new(session_id));
        self.options.connections.insert(session_id, ConnectionHandle {
            session: session.clone(),
            state: state.clone(),
        });

        loop {
            tokio::select! {
                _ = session.closed().cancelled() => break,
                msg = receiver.recv() => match msg {
                    Ok(msg) => self.dispatch(msg, &session, &state),
                    Err(_) => break,
                }
            }
        }

        session.close();
        state.dispose();
        self.options.connections.remove(&session_id);
        Ok(())
    }

    fn dispatch(&self, msg: Message, session: &Arc<Session>, state: &Arc<ConnectionState>) {
        match msg {
            Message::Request(req) => self.handle_request(req, session, state),
            Message::Response(resp) => {
                let id = resp.id.clone();
                session.handle_reply(&id, Ok(resp));
            }
            Message::Error(err) => {
                let id = err.id.clone();
                session.handle_reply(&id, Err(err.error.into()));
            }
            Message::Notification(notification) => {
                self.handle_notification(notification, session, state);
            }
        }
    }

    fn handle_request(&self, req: Request, session: &Arc<Session>, state: &Arc<ConnectionState>) {
        let id = req.id.clone();
        let token = session.inflight.track(&id, session.closed());

        let ctx = Context {
            options: self.options.clone(),
            session: session.clone(),
            state: state.clone(),
            request_id: id.clone(),
            progress_token: req.progress_token(),
            cancellation: token.clone(),
        };

        let handler = self.handlers.get(&req.method).cloned();
        let session = session.clone();

        tokio::spawn(async move {
            tracing::trace!(logger = "strom", "Received request {} ({id})", req.method);

            let reply = match handler {
                None => Some(Message::Error(ErrorResponse::new(
                    id.clone(),
                    Error::new(
                        ErrorCode::MethodNotFound,
                        format!("Unknown method: {}", req.method))))),
                Some(handler) => tokio::select! {
                    result = handler.call(HandlerParams::Request(ctx, req)) => {
                        Some(match result {
                            Ok(msg) => msg,
                            Err(err) => Message::Error(ErrorResponse::new(id.clone(), err)),
                        })
                    }
                    // A cancelled request gets no response on the wire.
                    _ = token.cancelled() => None,
                },
            };

            session.inflight.complete(&id);

            if let Some(reply) = reply {
                if let Err(err) = session.send_raw(reply).await {
                    tracing::error!(logger = "strom", "Error sending response: {err}");
                }
            }
        });
    }

    fn handle_notification(
        &self,
        notification: Notification,
        session: &Arc<Session>,
        state: &Arc<ConnectionState>,
    ) {
        match notification.method.as_str() {
            notifications::PROGRESS => {
                match notification.params::<ProgressNotificationParams>() {
                    Ok(params) => session.handle_progress(params),
                    Err(err) => tracing::debug!(
                        logger = "strom", "Malformed progress notification: {err}"),
                }
            }
            notifications::CANCELLED => {
                match notification.params::<CancelledNotificationParams>() {
                    Ok(params) => session.handle_cancelled(&params.request_id),
                    Err(err) => tracing::debug!(
                        logger = "strom", "Malformed cancelled notification: {err}"),
                }
            }
            notifications::INITIALIZED => {
                state.initialized.store(true, Ordering::Relaxed);
                self.run_notification_handler(notification, session, state);
            }
            _ => self.run_notification_handler(notification, session, state),
        }
    }

    fn run_notification_handler(
        &self,
        notification: Notification,
        session: &Arc<Session>,
        state: &Arc<ConnectionState>,
    ) {
        let Some(handler) = self.notifications.get(&notification.method).cloned() else {
            // A missing notification handler is a warning, not an error.
            tracing::debug!(
                logger = "strom",
                "No handler for notification {}", notification.method);
            return;
        };

        let ctx = Context {
            options: self.options.clone(),
            session: session.clone(),
            state: state.clone(),
            request_id: Default::default(),
            progress_token: None,
            cancellation: session.closed().child_token(),
        };

        tokio::spawn(handler(ctx, notification));
    }
}

/// Post-registration configuration of a tool entry.
pub struct ToolRegistration<'a> {
    options: &'a McpOptions,
    name: String,
}

impl ToolRegistration<'_> {
    /// Sets a description for the tool.
    pub fn with_description(self, descr: &str) -> Self {
        self.options.update_tool(&self.name, |t| t.descr = Some(descr.into()));
        self
    }

    /// Sets a human-readable title.
    pub fn with_title(self, title: &str) -> Self {
        self.options.update_tool(&self.name, |t| t.title = Some(title.into()));
        self
    }

    /// Replaces the generated input schema.
    pub fn with_schema<F>(self, config: F) -> Self
    where
        F: FnOnce(ToolSchema) -> ToolSchema,
    {
        self.options.update_tool(&self.name, |t| t.input_schema = config(ToolSchema::object()));
        self
    }

    /// Declares an output schema validated against `structuredContent`.
    pub fn with_output_schema<T: schemars::JsonSchema>(self) -> Self {
        self.options.update_tool(&self.name, |t| t.output_schema = Some(ToolSchema::of::<T>()));
        self
    }

    /// Declares a raw output schema.
    pub fn with_output_schema_value(self, schema: Value) -> Self {
        self.options
            .update_tool(&self.name, |t| t.output_schema = Some(ToolSchema::from_value(schema)));
        self
    }

    /// Configures behavior hints.
    pub fn with_annotations<F>(self, config: F) -> Self
    where
        F: FnOnce(ToolAnnotations) -> ToolAnnotations,
    {
        self.options
            .update_tool(&self.name, |t| t.annotations = Some(config(Default::default())));
        self
    }

    /// Demands task-augmented execution.
    ///
    /// # Panics
    /// Panics when the tool was registered through the direct-call path.
    pub fn with_required_task(self) -> Self {
        self.options.update_tool(&self.name, |t| {
            assert!(
                t.task_handler().is_some(),
                "Tool {} must be registered with map_task_tool to support tasks", t.name);
            t.execution = Some(crate::types::ToolExecution {
                task_support: TaskSupport::Required,
            });
        });
        self
    }

    /// Excludes the tool from listings without deleting it.
    pub fn disabled(self) -> Self {
        self.options.update_tool(&self.name, |t| t.enabled = false);
        self
    }
}

/// Post-registration configuration of a static resource.
pub struct ResourceRegistration<'a> {
    options: &'a McpOptions,
    uri: String,
}

impl ResourceRegistration<'_> {
    /// Sets a description.
    pub fn with_description(self, descr: &str) -> Self {
        self.options.update_resource(&self.uri, |r| r.descr = Some(descr.into()));
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(self, mime_type: &str) -> Self {
        self.options.update_resource(&self.uri, |r| r.mime_type = Some(mime_type.into()));
        self
    }

    /// Sets the read callback for this URI.
    pub fn read_with<F, R, Args>(self, handler: F) -> Self
    where
        F: GenericHandler<Args, Output = R>,
        R: TryInto<ReadResourceResult> + Send + 'static,
        R::Error: Into<Error>,
        Args: FromHandlerParams + Send + Sync + 'static,
    {
        let handler: RequestHandler<ReadResourceResult> = TypedFunc::new(handler);
        self.options.update_resource(&self.uri, move |r| r.handler = Some(handler));
        self
    }

    /// Excludes the resource from listings without deleting it.
    pub fn disabled(self) -> Self {
        self.options.update_resource(&self.uri, |r| r.enabled = false);
        self
    }
}

/// Post-registration configuration of a resource template.
pub struct TemplateRegistration<'a> {
    options: &'a McpOptions,
    name: String,
}

impl TemplateRegistration<'_> {
    /// Sets a description.
    pub fn with_description(self, descr: &str) -> Self {
        self.options.update_template(&self.name, |t| t.descr = Some(descr.into()));
        self
    }

    /// Sets the MIME type shared by matched resources.
    pub fn with_mime_type(self, mime_type: &str) -> Self {
        self.options.update_template(&self.name, |t| t.mime_type = Some(mime_type.into()));
        self
    }

    /// Sets the callback that enumerates matching concrete resources for
    /// `resources/list`.
    pub fn with_list<F, Fut>(self, list: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<Resource>, Error>> + Send + 'static,
    {
        let list: crate::types::resource::ResourceListCallback =
            Arc::new(move || Box::pin(list()) as BoxFuture<'static, _>);
        self.options.update_template(&self.name, move |t| t.list = Some(list));
        self
    }

    /// Sets a completion callback for one template argument.
    pub fn with_completion<F, Fut>(self, argument: &str, complete: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        let complete: crate::types::completion::CompletionCallback =
            Arc::new(move |value| Box::pin(complete(value)) as BoxFuture<'static, _>);
        let argument = argument.to_string();
        self.options
            .update_template(&self.name, move |t| { t.complete.insert(argument, complete); });
        self
    }

    /// Excludes the template from listings without deleting it.
    pub fn disabled(self) -> Self {
        self.options.update_template(&self.name, |t| t.enabled = false);
        self
    }
}

/// Post-registration configuration of a prompt.
pub struct PromptRegistration<'a> {
    options: &'a McpOptions,
    name: String,
}

impl PromptRegistration<'_> {
    /// Sets a description.
    pub fn with_description(self, descr: &str) -> Self {
        self.options.update_prompt(&self.name, |p| p.descr = Some(descr.into()));
        self
    }

    /// Declares the prompt's arguments.
    pub fn with_args<I>(self, args: I) -> Self
    where
        I: IntoIterator<Item = PromptArgument>,
    {
        let args: Vec<PromptArgument> = args.into_iter().collect();
        self.options.update_prompt(&self.name, move |p| p.args = Some(args));
        self
    }

    /// Sets a completion callback for one declared argument.
    pub fn with_completion<F, Fut>(self, argument: &str, complete: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Vec<String>> + Send + 'static,
    {
        let complete: crate::types::completion::CompletionCallback =
            Arc::new(move |value| Box::pin(complete(value)) as BoxFuture<'static, _>);
        let argument = argument.to_string();
        self.options
            .update_prompt(&self.name, move |p| { p.complete.insert(argument, complete); });
        self
    }

    /// Excludes the prompt from listings without deleting it.
    pub fn disabled(self) -> Self {
        self.options.update_prompt(&self.name, |p| p.enabled = false);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already registered")]
    fn it_panics_on_duplicate_tool_names() {
        let mut app = App::new();
        let _ = app.map_tool("t", || async { "" });
        let _ = app.map_tool("t", || async { "" });
    }

    #[test]
    fn it_registers_default_method_handlers() {
        let app = App::new();
        for method in [
            "initialize", "ping", "tools/list", "tools/call",
            "resources/list", "resources/templates/list", "resources/read",
            "resources/subscribe", "resources/unsubscribe",
            "prompts/list", "prompts/get",
            "completion/complete", "logging/setLevel",
            "tasks/list", "tasks/get", "tasks/cancel", "tasks/result",
        ] {
            assert!(app.handlers.contains_key(method), "missing handler for {method}");
        }
    }

    #[test]
    #[should_panic(expected = "must be registered with map_task_tool")]
    fn it_refuses_task_support_on_plain_tools() {
        let mut app = App::new();
        let _ = app.map_tool("t", || async { "" }).with_required_task();
    }
}
