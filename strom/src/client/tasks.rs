//! The client-side task facade

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::ClientRuntime;
use crate::error::Error;
use crate::session::RequestOptions;
use crate::types::{
    task::{commands, DEFAULT_POLL_INTERVAL_MS},
    CallToolRequestParams, CallToolResponse, CancelTaskRequestParams, CreateTaskResult, Cursor,
    GetTaskRequestParams, GetTaskResultRequestParams, ListTasksRequestParams, ListTasksResult,
    Task, TaskAugmentation, TaskStatus,
};

/// Typed wrappers around the `tasks/*` methods plus the streaming
/// task-augmented tool call.
pub struct TasksClient {
    rt: Arc<ClientRuntime>,
}

/// One event of a task-augmented tool call.
#[derive(Debug)]
pub enum ToolCallEvent {
    /// The server answered with a task handle.
    TaskCreated(Task),

    /// The task changed status while being polled.
    StatusChanged(Task),

    /// The final tool result.
    Result(CallToolResponse),
}

/// The wire reply to a task-augmented `tools/call`: either a task handle or
/// a direct result.
#[derive(Deserialize)]
#[serde(untagged)]
enum ToolCallReply {
    Task(CreateTaskResult),
    Direct(CallToolResponse),
}

enum StreamState {
    Start(CallToolRequestParams),
    Waiting(Task),
    Fetching(String),
    Finished,
}

/// A lazy sequence of task-call events: `TaskCreated`, zero or more
/// `StatusChanged`, then `Result` (or an error).
///
/// Polls `tasks/get` at the server-advised interval; when the task needs
/// input or completes, it switches to the blocking `tasks/result` side
/// channel, over which the server drives nested requests through this
/// client's reverse-request handlers.
pub struct ToolCallStream {
    rt: Arc<ClientRuntime>,
    state: StreamState,
}

impl TasksClient {
    pub(crate) fn new(rt: Arc<ClientRuntime>) -> Self {
        Self { rt }
    }

    /// Starts a task-augmented tool call.
    pub fn call_tool_stream<I, T>(
        &self,
        name: &str,
        args: Option<I>,
        augmentation: Option<TaskAugmentation>,
    ) -> ToolCallStream
    where
        I: IntoIterator<Item = (&'static str, T)>,
        T: Serialize,
    {
        let args: Option<HashMap<String, Value>> = args.map(|args| {
            args.into_iter()
                .filter_map(|(k, v)| serde_json::to_value(v).ok().map(|v| (k.to_string(), v)))
                .collect()
        });

        ToolCallStream {
            rt: self.rt.clone(),
            state: StreamState::Start(CallToolRequestParams {
                name: name.into(),
                args,
                task: Some(augmentation.unwrap_or_default()),
                meta: None,
            }),
        }
    }

    /// Retrieves the status of a task.
    pub async fn get(&self, id: &str) -> Result<Task, Error> {
        self.rt
            .request_typed(
                commands::GET,
                GetTaskRequestParams { id: id.into() },
                RequestOptions::default())
            .await
    }

    /// Retrieves a page of the server's tasks.
    pub async fn list(&self, cursor: Option<Cursor>) -> Result<ListTasksResult, Error> {
        self.rt
            .request_typed(
                commands::LIST,
                ListTasksRequestParams { cursor },
                RequestOptions::default())
            .await
    }

    /// Cancels a task; idempotent on terminal tasks.
    pub async fn cancel(&self, id: &str) -> Result<Task, Error> {
        self.rt
            .request_typed(
                commands::CANCEL,
                CancelTaskRequestParams { id: id.into() },
                RequestOptions::default())
            .await
    }

    /// Blocks until the task is terminal and returns its result.
    ///
    /// While this request is open the server may drive nested requests
    /// (elicitation, sampling) through the same session.
    pub async fn result<T: DeserializeOwned>(&self, id: &str) -> Result<T, Error> {
        self.rt
            .request_typed(
                commands::RESULT,
                GetTaskResultRequestParams { id: id.into() },
                RequestOptions::default().without_timeout())
            .await
    }
}

impl ToolCallStream {
    /// Advances the call and returns the next event, `None` once finished.
    pub async fn next_event(&mut self) -> Option<Result<ToolCallEvent, Error>> {
        loop {
            match std::mem::replace(&mut self.state, StreamState::Finished) {
                StreamState::Finished => return None,
                StreamState::Start(params) => {
                    let reply: Result<ToolCallReply, Error> = self.rt
                        .request_typed(
                            crate::types::tool::commands::CALL,
                            params,
                            RequestOptions::default())
                        .await;

                    return Some(match reply {
                        Ok(ToolCallReply::Task(created)) => {
                            self.state = StreamState::Waiting(created.task.clone());
                            Ok(ToolCallEvent::TaskCreated(created.task))
                        }
                        Ok(ToolCallReply::Direct(response)) => Ok(ToolCallEvent::Result(response)),
                        Err(err) => Err(err),
                    });
                }
                StreamState::Waiting(task) => {
                    let interval = task.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
                    tokio::time::sleep(Duration::from_millis(interval)).await;

                    let current = match self.tasks().get(&task.id).await {
                        Ok(current) => current,
                        Err(err) => return Some(Err(err)),
                    };

                    if current.status == task.status {
                        self.state = StreamState::Waiting(current);
                        continue;
                    }

                    match current.status {
                        TaskStatus::Working => {
                            self.state = StreamState::Waiting(current.clone());
                        }
                        // Every other state resolves through the result side
                        // channel, which carries the stored failure code.
                        _ => {
                            self.state = StreamState::Fetching(current.id.clone());
                        }
                    }
                    return Some(Ok(ToolCallEvent::StatusChanged(current)));
                }
                StreamState::Fetching(id) => {
                    let outcome: Result<CallToolResponse, Error> =
                        self.tasks().result(&id).await;
                    return Some(outcome.map(ToolCallEvent::Result));
                }
            }
        }
    }

    fn tasks(&self) -> TasksClient {
        TasksClient::new(self.rt.clone())
    }
}
