//! The long-running task subsystem
//!
//! A task wraps a tool call whose result is retrieved later: the server
//! replies with a task handle, the requester polls `tasks/get` and finally
//! fetches the result via the blocking `tasks/result` side channel. While a
//! task runs, its handler can push nested requests (elicitation, sampling)
//! to the requester through the same side channel.

pub use session::TaskSession;

pub(crate) mod queue;
pub(crate) mod result;
pub(crate) mod session;
pub(crate) mod store;

use crate::error::Error;
use crate::types::{CallToolRequestParams, Notification, Task, TaskAugmentation, Tool};
use crate::Context;

/// Spawns a task-aware tool call and returns its handle.
///
/// The handler runs detached from the originating request: its outcome lands
/// in the task store (`completed` with a stored result, or `failed`), and
/// every transition is announced via `notifications/tasks/status`.
pub(crate) fn spawn(
    tool: &Tool,
    ctx: &Context,
    params: CallToolRequestParams,
    augmentation: TaskAugmentation,
    augmented: bool,
) -> Result<Task, Error> {
    let handler = tool.task_handler().ok_or_else(|| Error::new(
        crate::error::ErrorCode::InternalError,
        format!("Tool {} was not registered through the task-aware path", tool.name)))?;

    let store = ctx.state.tasks.clone();
    let (task, cancel) = store.create(
        augmentation,
        Some(ctx.request_id.clone()),
        Some(ctx.session_id()));

    let task_session = TaskSession::new(task.id.clone(), ctx.clone(), cancel.clone(), augmented);
    let output_schema = tool.output_schema.clone();
    let queue = ctx.state.queue.clone();
    let notifier = ctx.clone();
    let id = task.id.clone();

    tokio::spawn(async move {
        let outcome = tokio::select! {
            outcome = handler(task_session, params) => Some(outcome),
            _ = cancel.cancelled() => None,
        };

        let update = match outcome {
            None => None,
            Some(Ok(result)) => {
                let validation = match (&output_schema, result.is_error) {
                    (Some(schema), false) => {
                        let instance = result.struct_content.clone().unwrap_or_default();
                        schema.validate(&instance, "structuredContent")
                    }
                    _ => Ok(()),
                };
                let stored = validation
                    .and_then(|()| serde_json::to_value(&result).map_err(Into::into));
                match stored {
                    Ok(value) => store.store_result(&id, value),
                    Err(err) => store.fail(&id, err),
                }
            }
            Some(Err(err)) => store.fail(&id, err),
        };

        queue.remove(&id);
        if let Some(task) = update {
            notify_status(&notifier, &task).await;
        }
    });

    Ok(task)
}

/// Emits `notifications/tasks/status`, tolerating capability refusals.
pub(crate) async fn notify_status(ctx: &Context, task: &Task) {
    if let Err(err) = ctx.session.notify(Notification::task_status(task)).await {
        tracing::debug!(logger = "strom", "Failed to push task status: {err}");
    }
}
