//! Types that describe negotiated client and server capabilities

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Capabilities a client may advertise during initialization.
///
/// A missing record means the capability is not supported. Records are merged
/// by recursive union; presence of a sub-object implies presence of its
/// parent.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientCapabilities {
    /// Present if the client can list filesystem roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Present if the client can serve `sampling/createMessage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,

    /// Present if the client can serve `elicitation/create`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,

    /// Present if the client can drive long-running tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<ClientTasksCapability>,

    /// Free-form experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Capabilities a server may advertise during initialization.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Present if the server can send log messages to the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,

    /// Present if the server offers any prompt templates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Present if the server offers any resources to read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Present if the server offers any tools to call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Present if the server supports argument autocompletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,

    /// Present if the server can run tool calls as tasks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<ServerTasksCapability>,

    /// Present if the server issues elicitations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,

    /// Free-form experimental capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

/// Roots capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RootsCapability {
    /// Whether the owner emits `notifications/roots/list_changed`.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Sampling capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SamplingCapability {
    /// Whether sampling requests may carry tool definitions.
    #[serde(default, skip_serializing_if = "is_false")]
    pub tools: bool,
}

/// Elicitation capability configuration; submodes gate the request `mode`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ElicitationCapability {
    /// In-band form elicitation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub form: bool,

    /// Out-of-band URL elicitation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub url: bool,
}

/// Task capability configuration on the client side.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClientTasksCapability {
    /// Whether the client may cancel tasks.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancel: bool,

    /// Whether the client may list tasks.
    #[serde(default, skip_serializing_if = "is_false")]
    pub list: bool,

    /// Reverse requests the client accepts inside a task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<TaskRequestsCapability>,
}

/// Reverse requests a client accepts while a task is running.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskRequestsCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<TaskElicitationRequests>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<TaskSamplingRequests>,
}

/// `elicitation/create` availability inside tasks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskElicitationRequests {
    #[serde(default, skip_serializing_if = "is_false")]
    pub create: bool,
}

/// `sampling/createMessage` availability inside tasks.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskSamplingRequests {
    #[serde(rename = "createMessage", default, skip_serializing_if = "is_false")]
    pub create_message: bool,
}

/// Task capability configuration on the server side.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ServerTasksCapability {
    /// Whether the server emits `notifications/tasks/status`.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Logging capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Completions capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CompletionsCapability {
    /// Whether the server notifies about completion source changes.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Tools capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Prompts capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PromptsCapability {
    /// Whether the server emits `notifications/prompts/list_changed`.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resources capability configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// Whether the server emits `notifications/resources/list_changed`.
    #[serde(rename = "listChanged", default, skip_serializing_if = "is_false")]
    pub list_changed: bool,

    /// Whether the server supports subscribing to resource updates.
    #[serde(default, skip_serializing_if = "is_false")]
    pub subscribe: bool,
}

impl ToolsCapability {
    /// Enables `notifications/tools/list_changed` emission.
    pub fn with_list_changed(mut self) -> Self {
        self.list_changed = true;
        self
    }
}

impl PromptsCapability {
    /// Enables `notifications/prompts/list_changed` emission.
    pub fn with_list_changed(mut self) -> Self {
        self.list_changed = true;
        self
    }
}

impl ResourcesCapability {
    /// Enables `notifications/resources/list_changed` emission.
    pub fn with_list_changed(mut self) -> Self {
        self.list_changed = true;
        self
    }

    /// Enables resource update subscriptions.
    pub fn with_subscribe(mut self) -> Self {
        self.subscribe = true;
        self
    }
}

impl ElicitationCapability {
    /// Enables form-mode elicitation.
    pub fn with_form(mut self) -> Self {
        self.form = true;
        self
    }

    /// Enables URL-mode elicitation.
    pub fn with_url(mut self) -> Self {
        self.url = true;
        self
    }
}

fn merge_opt<T>(a: Option<T>, b: Option<T>, merge: impl FnOnce(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(merge(a, b)),
        (a, b) => a.or(b),
    }
}

impl ClientCapabilities {
    /// Merges two records by recursive union.
    pub fn merge(self, other: Self) -> Self {
        Self {
            roots: merge_opt(self.roots, other.roots, |a, b| RootsCapability {
                list_changed: a.list_changed || b.list_changed,
            }),
            sampling: merge_opt(self.sampling, other.sampling, |a, b| SamplingCapability {
                tools: a.tools || b.tools,
            }),
            elicitation: merge_opt(self.elicitation, other.elicitation, |a, b| ElicitationCapability {
                form: a.form || b.form,
                url: a.url || b.url,
            }),
            tasks: merge_opt(self.tasks, other.tasks, |a, b| ClientTasksCapability {
                cancel: a.cancel || b.cancel,
                list: a.list || b.list,
                requests: merge_opt(a.requests, b.requests, |a, b| TaskRequestsCapability {
                    elicitation: merge_opt(a.elicitation, b.elicitation, |a, b| TaskElicitationRequests {
                        create: a.create || b.create,
                    }),
                    sampling: merge_opt(a.sampling, b.sampling, |a, b| TaskSamplingRequests {
                        create_message: a.create_message || b.create_message,
                    }),
                }),
            }),
            experimental: merge_opt(self.experimental, other.experimental, |mut a, b| {
                a.extend(b);
                a
            }),
        }
    }
}

impl ServerCapabilities {
    /// Merges two records by recursive union.
    pub fn merge(self, other: Self) -> Self {
        Self {
            logging: self.logging.or(other.logging),
            prompts: merge_opt(self.prompts, other.prompts, |a, b| PromptsCapability {
                list_changed: a.list_changed || b.list_changed,
            }),
            resources: merge_opt(self.resources, other.resources, |a, b| ResourcesCapability {
                list_changed: a.list_changed || b.list_changed,
                subscribe: a.subscribe || b.subscribe,
            }),
            tools: merge_opt(self.tools, other.tools, |a, b| ToolsCapability {
                list_changed: a.list_changed || b.list_changed,
            }),
            completions: merge_opt(self.completions, other.completions, |a, b| CompletionsCapability {
                list_changed: a.list_changed || b.list_changed,
            }),
            tasks: merge_opt(self.tasks, other.tasks, |a, b| ServerTasksCapability {
                list_changed: a.list_changed || b.list_changed,
            }),
            elicitation: merge_opt(self.elicitation, other.elicitation, |a, b| ElicitationCapability {
                form: a.form || b.form,
                url: a.url || b.url,
            }),
            experimental: merge_opt(self.experimental, other.experimental, |mut a, b| {
                a.extend(b);
                a
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_omits_missing_capabilities() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        };
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json, serde_json::json!({ "tools": {} }));
    }

    #[test]
    fn it_merges_by_union() {
        let a = ClientCapabilities {
            roots: Some(RootsCapability { list_changed: true }),
            ..Default::default()
        };
        let b = ClientCapabilities {
            roots: Some(RootsCapability { list_changed: false }),
            sampling: Some(SamplingCapability { tools: true }),
            ..Default::default()
        };

        let merged = a.merge(b);
        assert!(merged.roots.unwrap().list_changed);
        assert!(merged.sampling.unwrap().tools);
        assert!(merged.elicitation.is_none());
    }

    #[test]
    fn it_merges_nested_task_requests() {
        let a = ClientCapabilities {
            tasks: Some(ClientTasksCapability {
                cancel: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let b = ClientCapabilities {
            tasks: Some(ClientTasksCapability {
                list: true,
                requests: Some(TaskRequestsCapability {
                    elicitation: Some(TaskElicitationRequests { create: true }),
                    sampling: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let tasks = a.merge(b).tasks.unwrap();
        assert!(tasks.cancel && tasks.list);
        assert!(tasks.requests.unwrap().elicitation.unwrap().create);
    }
}
