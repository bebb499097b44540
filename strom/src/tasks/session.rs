//! The handle a task-aware tool handler works through

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::{Error, ErrorCode};
use crate::tasks::queue::QueuedRequest;
use crate::types::{
    elicitation, sampling, task::RELATED_TASK_KEY, CreateMessageRequestParams,
    CreateMessageResult, ElicitRequestParams, ElicitResult, RelatedTaskMetadata, TaskStatus,
};
use crate::Context;

/// The per-task handle passed to a task-aware tool handler.
///
/// Reverse requests issued through it flip the task to `input_required`,
/// travel to the requester over the `tasks/result` side channel (for
/// augmented calls) and restore `working` once answered.
#[derive(Clone)]
pub struct TaskSession {
    task_id: String,
    ctx: Context,
    cancel: CancellationToken,
    augmented: bool,
}

impl TaskSession {
    pub(crate) fn new(
        task_id: String,
        ctx: Context,
        cancel: CancellationToken,
        augmented: bool,
    ) -> Self {
        Self { task_id, ctx, cancel, augmented }
    }

    /// The id of the task this handler runs.
    #[inline]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Resolves when the task is cancelled; long handlers should poll this.
    #[inline]
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the task was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Updates the human-readable status message of the task.
    pub async fn update_message(&self, msg: impl Into<String>) {
        let update = self.ctx.state.tasks.update_status(
            &self.task_id,
            TaskStatus::Working,
            Some(msg.into()));
        if let Some(task) = update {
            crate::tasks::notify_status(&self.ctx, &task).await;
        }
    }

    /// Requests structured user input from inside the task.
    pub async fn elicit(&self, params: ElicitRequestParams) -> Result<ElicitResult, Error> {
        self.reverse_request(elicitation::commands::CREATE, params).await
    }

    /// Requests an LLM completion from inside the task.
    pub async fn create_message(
        &self,
        params: CreateMessageRequestParams,
    ) -> Result<CreateMessageResult, Error> {
        self.reverse_request(sampling::commands::CREATE, params).await
    }

    async fn reverse_request<P, R>(&self, method: &str, params: P) -> Result<R, Error>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !self.augmented {
            // Direct optional-mode execution: the originating request is
            // still open, so reverse requests flow like any other.
            let value = self.ctx
                .relay(method, serde_json::to_value(params)?, Default::default())
                .await?;
            return serde_json::from_value(value).map_err(Into::into);
        }

        let params = tag_with_task(serde_json::to_value(params)?, &self.task_id)?;

        let update = self.ctx.state.tasks.update_status(
            &self.task_id,
            TaskStatus::InputRequired,
            None);
        let Some(task) = update else {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                format!("Task {} is no longer running", self.task_id)));
        };
        crate::tasks::notify_status(&self.ctx, &task).await;

        let (resolver, outcome) = oneshot::channel();
        self.ctx.state.queue.enqueue(&self.task_id, QueuedRequest {
            method: method.into(),
            params,
            resolver,
            queued_at: chrono::Utc::now(),
            original_request_id: Some(self.ctx.request_id.clone()),
        });

        let value = tokio::select! {
            outcome = outcome => outcome
                .map_err(|_| Error::new(
                    ErrorCode::ConnectionClosed,
                    "Task was disposed before the request was answered"))?,
            _ = self.cancel.cancelled() => Err(Error::new(
                ErrorCode::RequestCancelled,
                "Task was cancelled while waiting for input")),
        };

        if let Some(task) = self.ctx.state.tasks.update_status(
            &self.task_id, TaskStatus::Working, None)
        {
            crate::tasks::notify_status(&self.ctx, &task).await;
        }

        serde_json::from_value(value?).map_err(Into::into)
    }
}

/// Attaches the related-task marker under `_meta`.
fn tag_with_task(mut params: Value, task_id: &str) -> Result<Value, Error> {
    let meta_entry = serde_json::to_value(RelatedTaskMetadata::from(task_id))?;
    if let Value::Object(map) = &mut params {
        let meta = map
            .entry("_meta")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(meta) = meta {
            meta.insert(RELATED_TASK_KEY.into(), meta_entry);
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_tags_params_with_the_related_task() {
        let tagged = tag_with_task(json!({ "message": "?" }), "T1").unwrap();
        assert_eq!(tagged["_meta"][RELATED_TASK_KEY]["taskId"], "T1");
        assert_eq!(tagged["message"], "?");
    }

    #[test]
    fn it_preserves_existing_meta_entries() {
        let tagged = tag_with_task(
            json!({ "_meta": { "progressToken": "p" } }), "T1").unwrap();
        assert_eq!(tagged["_meta"]["progressToken"], "p");
        assert_eq!(tagged["_meta"][RELATED_TASK_KEY]["taskId"], "T1");
    }
}
