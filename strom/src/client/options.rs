//! MCP client configuration options

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::Error;
use crate::session::DEFAULT_REQUEST_TIMEOUT;
use crate::transport::TransportProto;
use crate::types::{
    capabilities::{
        ClientTasksCapability, ElicitationCapability, RootsCapability, SamplingCapability,
        TaskElicitationRequests, TaskRequestsCapability, TaskSamplingRequests,
    },
    ClientCapabilities, CreateMessageRequestParams, CreateMessageResult, ElicitRequestParams,
    ElicitResult, Implementation, Root, Task,
};

/// Serves `sampling/createMessage` requests from the server.
pub(crate) type SamplingHandler = Arc<
    dyn Fn(CreateMessageRequestParams) -> BoxFuture<'static, Result<CreateMessageResult, Error>>
    + Send
    + Sync
>;

/// Serves `elicitation/create` requests from the server.
pub(crate) type ElicitationHandler = Arc<
    dyn Fn(ElicitRequestParams) -> BoxFuture<'static, Result<ElicitResult, Error>>
    + Send
    + Sync
>;

/// Observes `notifications/tasks/status`.
pub(crate) type TaskStatusHandler = Arc<
    dyn Fn(Task)
    + Send
    + Sync
>;

/// Represents MCP client configuration options
pub struct ClientOptions {
    /// Information about the current client implementation.
    pub(crate) implementation: Implementation,

    /// The protocol version the client asks for; latest when unset.
    pub(crate) protocol_ver: Option<&'static str>,

    /// Default deadline for outbound requests.
    pub(crate) request_timeout: Duration,

    /// Whether capability violations fail instead of warning.
    pub(crate) strict_capabilities: bool,

    /// The transport to connect over.
    pub(crate) proto: Option<TransportProto>,

    /// Roots exposed through `roots/list`.
    pub(crate) roots: Option<Vec<Root>>,

    /// The sampling callback; advertises the sampling capability when set.
    pub(crate) sampling: Option<SamplingHandler>,

    /// The elicitation callback; advertises the elicitation capability when
    /// set.
    pub(crate) elicitation: Option<ElicitationHandler>,

    /// Fill accepted form content with schema defaults before replying.
    pub(crate) apply_elicitation_defaults: bool,

    /// Observer for task status notifications.
    pub(crate) task_status: Option<TaskStatusHandler>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            implementation: Implementation::default(),
            protocol_ver: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            strict_capabilities: true,
            proto: None,
            roots: None,
            sampling: None,
            elicitation: None,
            apply_elicitation_defaults: false,
            task_status: None,
        }
    }
}

impl ClientOptions {
    /// Specifies the MCP client name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.implementation.name = name.into();
        self
    }

    /// Specifies the MCP client version.
    pub fn with_version(mut self, ver: &str) -> Self {
        self.implementation.version = ver.into();
        self
    }

    /// Specifies the protocol revision to request.
    pub fn with_mcp_version(mut self, ver: &'static str) -> Self {
        self.protocol_ver = Some(ver);
        self
    }

    /// Sets the default deadline for outbound requests.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Downgrades capability violations from errors to warnings.
    pub fn relaxed_capabilities(mut self) -> Self {
        self.strict_capabilities = false;
        self
    }

    /// Connects over the given transport.
    pub fn with_transport(mut self, proto: impl Into<TransportProto>) -> Self {
        self.proto = Some(proto.into());
        self
    }

    /// Exposes filesystem roots; advertises the roots capability.
    pub fn with_roots<I>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = Root>,
    {
        self.roots = Some(roots.into_iter().collect());
        self
    }

    /// Serves `sampling/createMessage` with the given callback.
    pub fn with_sampling_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(CreateMessageRequestParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<CreateMessageResult, Error>> + Send + 'static,
    {
        self.sampling = Some(Arc::new(move |params| {
            Box::pin(handler(params)) as BoxFuture<'static, _>
        }));
        self
    }

    /// Serves `elicitation/create` with the given callback.
    pub fn with_elicitation_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(ElicitRequestParams) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ElicitResult, Error>> + Send + 'static,
    {
        self.elicitation = Some(Arc::new(move |params| {
            Box::pin(handler(params)) as BoxFuture<'static, _>
        }));
        self
    }

    /// Fills accepted form content with the requested schema's defaults
    /// before the reply leaves the client.
    pub fn with_elicitation_defaults(mut self) -> Self {
        self.apply_elicitation_defaults = true;
        self
    }

    /// Observes task status notifications.
    pub fn on_task_status<F>(mut self, handler: F) -> Self
    where
        F: Fn(Task) + Send + Sync + 'static,
    {
        self.task_status = Some(Arc::new(handler));
        self
    }

    /// The protocol revision this client requests.
    #[inline]
    pub(crate) fn protocol_ver(&self) -> &'static str {
        match self.protocol_ver {
            Some(ver) => ver,
            None => crate::latest_protocol_version(),
        }
    }

    /// The capabilities to advertise, derived from the configured handlers.
    pub(crate) fn client_capabilities(&self) -> ClientCapabilities {
        ClientCapabilities {
            roots: self.roots.as_ref().map(|_| RootsCapability { list_changed: true }),
            sampling: self.sampling.as_ref().map(|_| SamplingCapability::default()),
            elicitation: self.elicitation.as_ref().map(|_| ElicitationCapability {
                form: true,
                url: true,
            }),
            tasks: Some(ClientTasksCapability {
                cancel: true,
                list: true,
                requests: Some(TaskRequestsCapability {
                    elicitation: Some(TaskElicitationRequests {
                        create: self.elicitation.is_some(),
                    }),
                    sampling: Some(TaskSamplingRequests {
                        create_message: self.sampling.is_some(),
                    }),
                }),
            }),
            experimental: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_capabilities_from_handlers() {
        let options = ClientOptions::default();
        let caps = options.client_capabilities();
        assert!(caps.roots.is_none());
        assert!(caps.sampling.is_none());
        assert!(caps.elicitation.is_none());
        assert!(caps.tasks.is_some());

        let options = ClientOptions::default()
            .with_roots([Root::new("file:///work", "work")])
            .with_elicitation_handler(|_| async { Ok(ElicitResult::decline()) });
        let caps = options.client_capabilities();
        assert!(caps.roots.unwrap().list_changed);
        assert!(caps.elicitation.unwrap().form);
    }

    #[test]
    fn it_prefers_latest_protocol_version() {
        let options = ClientOptions::default();
        assert_eq!(options.protocol_ver(), crate::latest_protocol_version());

        let options = ClientOptions::default().with_mcp_version("2024-11-05");
        assert_eq!(options.protocol_ver(), "2024-11-05");
    }
}
