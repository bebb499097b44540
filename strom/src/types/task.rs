//! Types for task-augmented requests and task lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Cursor, Page};

/// The `_meta` key that correlates a nested request with its task.
pub(crate) const RELATED_TASK_KEY: &str = "io.modelcontextprotocol/related-task";

/// Default retention for a task, in milliseconds from creation.
pub(crate) const DEFAULT_TASK_TTL_MS: u64 = 30_000;

/// Default polling interval advertised on created tasks, in milliseconds.
pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// List of commands for tasks
pub mod commands {
    /// Command name that returns the tasks currently known to the receiver.
    pub const LIST: &str = "tasks/list";

    /// Command name that cancels a task.
    pub const CANCEL: &str = "tasks/cancel";

    /// Command name that returns the status of a task.
    pub const GET: &str = "tasks/get";

    /// Command name that blocks until a task is terminal and returns its result.
    pub const RESULT: &str = "tasks/result";

    /// Notification name announcing a task status change.
    pub const STATUS: &str = "notifications/tasks/status";
}

/// A long-running operation referenceable by id, with status and result
/// lifecycles independent of the request that spawned it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// The task identifier.
    #[serde(rename = "taskId")]
    pub id: String,

    /// Current task state.
    pub status: TaskStatus,

    /// Optional human-readable message describing the current state:
    /// a cancellation reason, a completion summary, or failure diagnostics.
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_msg: Option<String>,

    /// Retention duration from creation in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// Suggested polling interval in milliseconds.
    #[serde(rename = "pollInterval", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<u64>,

    /// When the task was created.
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// When the task last changed.
    #[serde(rename = "lastUpdatedAt")]
    pub last_updated_at: DateTime<Utc>,
}

/// The status of a task.
///
/// Transitions: `working` ⇄ `input_required`, then exactly one of
/// `completed`, `failed` or `cancelled`. The last three are terminal.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task is currently running.
    #[default]
    #[serde(rename = "working")]
    Working,

    /// Task is blocked on input from the requester.
    #[serde(rename = "input_required")]
    InputRequired,

    /// Task completed successfully.
    #[serde(rename = "completed")]
    Completed,

    /// Task failed.
    #[serde(rename = "failed")]
    Failed,

    /// Task was cancelled.
    #[serde(rename = "cancelled")]
    Cancelled,
}

impl TaskStatus {
    /// Whether the status admits no further transitions.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Marker that turns a `tools/call` into a task-augmented call.
///
/// Accepted from either the `task` field of the params or `_meta.task`;
/// emitted as the `task` field.
#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskAugmentation {
    /// Requested retention in milliseconds from creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Correlates a message with a task; carried in `_meta` under
/// `io.modelcontextprotocol/related-task`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct RelatedTaskMetadata {
    /// The task identifier this message belongs to.
    #[serde(rename = "taskId")]
    pub id: String,
}

impl<T: Into<String>> From<T> for RelatedTaskMetadata {
    #[inline]
    fn from(value: T) -> Self {
        Self { id: value.into() }
    }
}

/// The reply to a task-augmented request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskResult {
    /// Newly created task information.
    pub task: Task,

    /// Metadata reserved for protocol-level information.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Parameters of `tasks/get`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskRequestParams {
    /// The task identifier to retrieve the state for.
    #[serde(rename = "taskId")]
    pub id: String,
}

/// Parameters of `tasks/result`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct GetTaskResultRequestParams {
    /// The task identifier to retrieve the result for.
    #[serde(rename = "taskId")]
    pub id: String,
}

/// Parameters of `tasks/cancel`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct CancelTaskRequestParams {
    /// The task identifier to cancel.
    #[serde(rename = "taskId")]
    pub id: String,
}

/// Parameters of `tasks/list`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksRequestParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The response to a `tasks/list` request.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListTasksResult {
    /// The tasks currently known to the receiver.
    pub tasks: Vec<Task>,

    /// The position to resume from, `None` when this is the last page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl From<Page<Task>> for ListTasksResult {
    #[inline]
    fn from(page: Page<Task>) -> Self {
        Self {
            tasks: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

impl Task {
    /// Creates a new working [`Task`] with a fresh id.
    pub(crate) fn create(augmentation: TaskAugmentation) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: TaskStatus::Working,
            status_msg: None,
            ttl: Some(augmentation.ttl.unwrap_or(DEFAULT_TASK_TTL_MS)),
            poll_interval: Some(DEFAULT_POLL_INTERVAL_MS),
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Moves the task into `status`, refusing transitions out of a terminal
    /// state. Returns whether the transition happened.
    pub(crate) fn transition(&mut self, status: TaskStatus, msg: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if msg.is_some() {
            self.status_msg = msg;
        }
        self.last_updated_at = Utc::now();
        true
    }
}

impl CreateTaskResult {
    /// Creates a new [`CreateTaskResult`]
    pub fn new(task: Task) -> Self {
        Self { task, meta: None }
    }
}

crate::types::response::impl_into_response! {
    Task,
    CreateTaskResult,
    ListTasksResult,
}
