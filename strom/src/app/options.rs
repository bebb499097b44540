//! MCP server configuration and registries

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::app::context::ConnectionHandle;
use crate::error::{Error, ErrorCode};
use crate::session::DEFAULT_REQUEST_TIMEOUT;
use crate::transport::{http::StreamableHttpOptions, TransportProto};
use crate::types::{
    CompletionsCapability, Cursor, ElicitationCapability, Implementation, LoggingCapability,
    Notification, Page, Pagination, Prompt, PromptsCapability, Resource, ResourcesCapability,
    ResourceTemplate, ServerCapabilities, ServerTasksCapability, Tool, ToolsCapability,
};
use crate::PROTOCOL_VERSIONS;

/// How many entries a list response returns per page.
pub(crate) const DEFAULT_PAGE_SIZE: usize = 10;

/// An ordered, uniquely-keyed registration table.
///
/// Keeps registration order, which list responses must preserve; the index
/// only accelerates lookups. Guarded by a std lock that is never held across
/// an await.
pub(crate) struct Registry<T> {
    kind: &'static str,
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Clone> Registry<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, key: String, entry: T) -> Result<(), Error> {
        if self.index.contains_key(&key) {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                format!("{} '{key}' is already registered", self.kind)));
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.index.get(key).copied().map(move |i| &mut self.entries[i])
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(&self, enabled: impl Fn(&T) -> bool) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| enabled(e))
            .cloned()
            .collect()
    }
}

/// Represents MCP server configuration options
pub struct McpOptions {
    /// Information about the current server implementation.
    pub(crate) implementation: Implementation,

    /// Default deadline for outbound requests.
    pub(crate) request_timeout: Duration,

    /// Whether capability violations fail instead of warning.
    pub(crate) strict_capabilities: bool,

    /// Optional usage instructions surfaced in the initialize result.
    pub(crate) instructions: Option<String>,

    /// The protocol version the server prefers; latest when unset.
    protocol_ver: Option<&'static str>,

    /// The transport to serve on.
    pub(crate) proto: Option<TransportProto>,

    /// The streamable HTTP configuration, when serving over HTTP.
    pub(crate) http: Option<StreamableHttpOptions>,

    /// Tools capability flags.
    pub(crate) tools_capability: ToolsCapability,

    /// Resources capability flags.
    pub(crate) resources_capability: ResourcesCapability,

    /// Prompts capability flags.
    pub(crate) prompts_capability: PromptsCapability,

    /// Tasks capability flags.
    pub(crate) tasks_capability: ServerTasksCapability,

    /// Elicitation capability, advertised only when configured.
    pub(crate) elicitation_capability: Option<ElicitationCapability>,

    tools: RwLock<Registry<Tool>>,
    resources: RwLock<Registry<Resource>>,
    templates: RwLock<Registry<ResourceTemplate>>,
    prompts: RwLock<Registry<Prompt>>,

    /// Live connections, keyed by session id.
    pub(crate) connections: DashMap<Uuid, ConnectionHandle>,
}

impl Default for McpOptions {
    fn default() -> Self {
        Self {
            implementation: Implementation::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            strict_capabilities: true,
            instructions: None,
            protocol_ver: None,
            proto: None,
            http: None,
            tools_capability: ToolsCapability { list_changed: true },
            resources_capability: ResourcesCapability { list_changed: true, subscribe: true },
            prompts_capability: PromptsCapability { list_changed: true },
            tasks_capability: ServerTasksCapability { list_changed: true },
            elicitation_capability: None,
            tools: RwLock::new(Registry::new("Tool")),
            resources: RwLock::new(Registry::new("Resource")),
            templates: RwLock::new(Registry::new("Resource template")),
            prompts: RwLock::new(Registry::new("Prompt")),
            connections: DashMap::new(),
        }
    }
}

/// A cheaply cloneable handle to the options after the server started.
#[derive(Clone)]
pub struct RuntimeMcpOptions(Arc<McpOptions>);

impl Deref for RuntimeMcpOptions {
    type Target = McpOptions;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<McpOptions> for RuntimeMcpOptions {
    #[inline]
    fn from(options: McpOptions) -> Self {
        Self(Arc::new(options))
    }
}

impl McpOptions {
    /// Specifies the MCP server name.
    pub fn with_name(mut self, name: &str) -> Self {
        self.implementation.name = name.into();
        self
    }

    /// Specifies the MCP server version.
    pub fn with_version(mut self, ver: &str) -> Self {
        self.implementation.version = ver.into();
        self
    }

    /// Specifies the preferred protocol revision.
    ///
    /// Default: the latest supported revision.
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

    /// Sets usage instructions surfaced to clients.
    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Serves on the given transport.
    pub fn with_transport(mut self, proto: impl Into<TransportProto>) -> Self {
        self.proto = Some(proto.into());
        self
    }

    /// Serves over the streamable HTTP transport.
    pub fn with_streamable_http<F>(mut self, config: F) -> Self
    where
        F: FnOnce(StreamableHttpOptions) -> StreamableHttpOptions,
    {
        self.http = Some(config(StreamableHttpOptions::default()));
        self
    }

    /// Configures the tools capability flags.
    pub fn with_tools<F>(mut self, config: F) -> Self
    where
        F: FnOnce(ToolsCapability) -> ToolsCapability,
    {
        self.tools_capability = config(self.tools_capability);
        self
    }

    /// Configures the resources capability flags.
    pub fn with_resources<F>(mut self, config: F) -> Self
    where
        F: FnOnce(ResourcesCapability) -> ResourcesCapability,
    {
        self.resources_capability = config(self.resources_capability);
        self
    }

    /// Configures the prompts capability flags.
    pub fn with_prompts<F>(mut self, config: F) -> Self
    where
        F: FnOnce(PromptsCapability) -> PromptsCapability,
    {
        self.prompts_capability = config(self.prompts_capability);
        self
    }

    /// Advertises the server elicitation capability.
    pub fn with_elicitation<F>(mut self, config: F) -> Self
    where
        F: FnOnce(ElicitationCapability) -> ElicitationCapability,
    {
        self.elicitation_capability = Some(config(ElicitationCapability::default()));
        self
    }

    /// The protocol revision this server prefers.
    #[inline]
    pub(crate) fn protocol_ver(&self) -> &'static str {
        match self.protocol_ver {
            Some(ver) => ver,
            None => crate::latest_protocol_version(),
        }
    }

    /// Whether the server can speak the given revision.
    #[inline]
    pub(crate) fn supports_version(&self, ver: &str) -> bool {
        PROTOCOL_VERSIONS.contains(&ver)
    }

    /// The capabilities to advertise, derived from configuration and the
    /// current registries: a capability is present once its registry has an
    /// entry (or the flag was configured explicitly elsewhere).
    pub(crate) fn server_capabilities(&self) -> ServerCapabilities {
        let has_tools = !self.tools.read().expect("registry lock").is_empty();
        let has_resources = {
            !self.resources.read().expect("registry lock").is_empty()
                || !self.templates.read().expect("registry lock").is_empty()
        };
        let has_prompts = !self.prompts.read().expect("registry lock").is_empty();
        let has_tasks = self
            .tools.read().expect("registry lock")
            .entries.iter()
            .any(|t| t.task_support() != crate::types::TaskSupport::Forbidden);

        ServerCapabilities {
            logging: Some(LoggingCapability::default()),
            completions: Some(CompletionsCapability::default()),
            tools: has_tools.then(|| self.tools_capability.clone()),
            resources: has_resources.then(|| self.resources_capability.clone()),
            prompts: has_prompts.then(|| self.prompts_capability.clone()),
            tasks: has_tasks.then(|| self.tasks_capability.clone()),
            elicitation: self.elicitation_capability.clone(),
            experimental: None,
        }
    }

    /// Registers a tool; re-registering the same name is an error.
    pub(crate) fn add_tool(&self, tool: Tool) -> Result<(), Error> {
        self.tools
            .write().expect("registry lock")
            .insert(tool.name.clone(), tool)?;
        self.notify_list_changed(crate::types::tool::commands::LIST_CHANGED);
        Ok(())
    }

    /// Registers a static resource keyed by URI.
    pub(crate) fn add_resource(&self, resource: Resource) -> Result<(), Error> {
        self.resources
            .write().expect("registry lock")
            .insert(resource.uri.clone(), resource)?;
        self.notify_list_changed(crate::types::resource::commands::LIST_CHANGED);
        Ok(())
    }

    /// Registers a resource template keyed by name.
    pub(crate) fn add_template(&self, template: ResourceTemplate) -> Result<(), Error> {
        self.templates
            .write().expect("registry lock")
            .insert(template.name.clone(), template)?;
        self.notify_list_changed(crate::types::resource::commands::LIST_CHANGED);
        Ok(())
    }

    /// Registers a prompt keyed by name.
    pub(crate) fn add_prompt(&self, prompt: Prompt) -> Result<(), Error> {
        self.prompts
            .write().expect("registry lock")
            .insert(prompt.name.clone(), prompt)?;
        self.notify_list_changed(crate::types::prompt::commands::LIST_CHANGED);
        Ok(())
    }

    pub(crate) fn update_tool(&self, name: &str, update: impl FnOnce(&mut Tool)) -> bool {
        let mut tools = self.tools.write().expect("registry lock");
        match tools.get_mut(name) {
            Some(tool) => { update(tool); true }
            None => false,
        }
    }

    pub(crate) fn update_resource(&self, uri: &str, update: impl FnOnce(&mut Resource)) -> bool {
        let mut resources = self.resources.write().expect("registry lock");
        match resources.get_mut(uri) {
            Some(resource) => { update(resource); true }
            None => false,
        }
    }

    pub(crate) fn update_template(
        &self,
        name: &str,
        update: impl FnOnce(&mut ResourceTemplate),
    ) -> bool {
        let mut templates = self.templates.write().expect("registry lock");
        match templates.get_mut(name) {
            Some(template) => { update(template); true }
            None => false,
        }
    }

    pub(crate) fn update_prompt(&self, name: &str, update: impl FnOnce(&mut Prompt)) -> bool {
        let mut prompts = self.prompts.write().expect("registry lock");
        match prompts.get_mut(name) {
            Some(prompt) => { update(prompt); true }
            None => false,
        }
    }

    /// Returns an enabled tool by name.
    pub(crate) fn tool(&self, name: &str) -> Option<Tool> {
        self.tools
            .read().expect("registry lock")
            .get(name)
            .filter(|t| t.enabled)
            .cloned()
    }

    /// Returns an enabled static resource by URI.
    pub(crate) fn resource(&self, uri: &str) -> Option<Resource> {
        self.resources
            .read().expect("registry lock")
            .get(uri)
            .filter(|r| r.enabled)
            .cloned()
    }

    /// Returns an enabled prompt by name.
    pub(crate) fn prompt(&self, name: &str) -> Option<Prompt> {
        self.prompts
            .read().expect("registry lock")
            .get(name)
            .filter(|p| p.enabled)
            .cloned()
    }

    /// One page of enabled tools, in registration order.
    pub(crate) fn tools_page(&self, cursor: Option<Cursor>) -> Page<Tool> {
        self.tools
            .read().expect("registry lock")
            .snapshot(|t| t.enabled)
            .paginate(cursor, DEFAULT_PAGE_SIZE)
    }

    /// Every enabled static resource, in registration order.
    pub(crate) fn static_resources(&self) -> Vec<Resource> {
        self.resources
            .read().expect("registry lock")
            .snapshot(|r| r.enabled)
    }

    /// Every enabled template, in registration order.
    pub(crate) fn resource_templates(&self) -> Vec<ResourceTemplate> {
        self.templates
            .read().expect("registry lock")
            .snapshot(|t| t.enabled)
    }

    /// One page of enabled templates, in registration order.
    pub(crate) fn templates_page(&self, cursor: Option<Cursor>) -> Page<ResourceTemplate> {
        self.resource_templates().paginate(cursor, DEFAULT_PAGE_SIZE)
    }

    /// One page of enabled prompts, in registration order.
    pub(crate) fn prompts_page(&self, cursor: Option<Cursor>) -> Page<Prompt> {
        self.prompts
            .read().expect("registry lock")
            .snapshot(|p| p.enabled)
            .paginate(cursor, DEFAULT_PAGE_SIZE)
    }

    /// Pushes a list-changed notification to every live connection.
    fn notify_list_changed(&self, method: &'static str) {
        if self.connections.is_empty() {
            return;
        }
        let caps = self.server_capabilities();
        for entry in self.connections.iter() {
            let session = entry.value().session.clone();
            session.set_local_capabilities(crate::session::LocalCapabilities::Server(caps.clone()));
            tokio::spawn(async move {
                if let Err(err) = session.notify(Notification::new(method, None)).await {
                    tracing::debug!(logger = "strom", "Failed to notify {method}: {err}");
                }
            });
        }
    }

    /// Pushes `notifications/resources/updated` to every subscribed session.
    pub(crate) fn notify_resource_updated(&self, uri: &str) {
        for entry in self.connections.iter() {
            if !entry.value().state.subscriptions.contains(uri) {
                continue;
            }
            let session = entry.value().session.clone();
            let notification = Notification::of(
                crate::types::resource::commands::UPDATED,
                crate::types::ResourceUpdatedNotificationParams { uri: uri.into() });
            tokio::spawn(async move {
                if let Err(err) = session.notify(notification).await {
                    tracing::debug!(logger = "strom", "Failed to notify resource update: {err}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_rejects_duplicate_registrations() {
        let options = McpOptions::default();
        options.add_tool(Tool::plain("t", || async { "" })).unwrap();

        let err = options.add_tool(Tool::plain("t", || async { "" })).unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn it_lists_tools_in_registration_order() {
        let options = McpOptions::default();
        for name in ["c", "a", "b"] {
            options.add_tool(Tool::plain(name, || async { "" })).unwrap();
        }

        let page = options.tools_page(None);
        let names: Vec<_> = page.items.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn it_hides_disabled_tools_without_deleting() {
        let options = McpOptions::default();
        options.add_tool(Tool::plain("t", || async { "" })).unwrap();

        options.update_tool("t", |t| t.enabled = false);
        assert!(options.tools_page(None).items.is_empty());
        assert!(options.tool("t").is_none());

        options.update_tool("t", |t| t.enabled = true);
        assert_eq!(options.tools_page(None).items.len(), 1);
    }

    #[test]
    fn it_derives_capabilities_from_registries() {
        let options = McpOptions::default();
        let caps = options.server_capabilities();
        assert!(caps.tools.is_none());
        assert!(caps.logging.is_some());

        options.add_tool(Tool::plain("t", || async { "" })).unwrap();
        let caps = options.server_capabilities();
        assert!(caps.tools.is_some());
        assert!(caps.tasks.is_none());
    }

    #[test]
    fn it_paginates_tool_pages() {
        let options = McpOptions::default();
        for i in 0..25 {
            options.add_tool(Tool::plain(&format!("t{i}"), || async { "" })).unwrap();
        }

        let first = options.tools_page(None);
        assert_eq!(first.items.len(), DEFAULT_PAGE_SIZE);
        let second = options.tools_page(first.next_cursor);
        assert_eq!(second.items[0].name, "t10");
    }
}
