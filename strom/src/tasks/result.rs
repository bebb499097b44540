//! The blocking `tasks/result` service loop

use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::session::RequestOptions;
use crate::types::TaskStatus;
use crate::Context;

/// Serves one `tasks/result` request.
///
/// Alternates between two duties until the task is terminal: relay queued
/// nested requests to the requester (feeding replies back through their
/// resolvers), and watch the store for status changes. Returns the stored
/// result for `completed`, an error for `failed` and `cancelled`.
pub(crate) async fn serve(ctx: &Context, task_id: &str) -> Result<Value, Error> {
    let store = ctx.state.tasks.clone();
    let queue = ctx.state.queue.clone();

    if let Some((origin, _)) = store.origin(task_id) {
        tracing::debug!(
            logger = "strom",
            "Serving tasks/result for task {task_id} (spawned by request {origin:?})");
    }

    loop {
        let task = store.get(task_id)?;
        match task.status {
            TaskStatus::Completed => return store.get_result(task_id),
            TaskStatus::Failed => {
                // Surface the failure with the code the handler produced it
                // under, not a generic internal error.
                return Err(store.failure(task_id).unwrap_or_else(|| Error::new(
                    ErrorCode::InternalError,
                    task.status_msg.unwrap_or_else(|| "Task failed".into()))));
            }
            TaskStatus::Cancelled => {
                return Err(Error::new(
                    ErrorCode::InvalidRequest,
                    task.status_msg.unwrap_or_else(|| "Task was cancelled".into())));
            }
            TaskStatus::Working | TaskStatus::InputRequired => {
                tokio::select! {
                    queued = queue.wait_for_message(task_id) => {
                        let outcome = ctx
                            .relay(&queued.method, queued.params, RequestOptions::default())
                            .await;
                        if queued.resolver.send(outcome).is_err() {
                            tracing::debug!(
                                logger = "strom",
                                "Task {task_id} dropped its resolver before the reply arrived");
                        }
                    }
                    _ = store.wait_for_update(task_id) => {}
                    _ = ctx.cancelled() => {
                        return Err(Error::new(
                            ErrorCode::RequestCancelled,
                            "tasks/result was cancelled"));
                    }
                }
            }
        }
    }
}
