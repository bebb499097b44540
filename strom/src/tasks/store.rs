//! The in-memory task store

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, ErrorCode};
use crate::types::{
    Cursor, Page, Pagination, RequestId, Task, TaskAugmentation, TaskStatus,
};

struct TaskEntry {
    task: Task,
    result: Option<Value>,
    /// The error a failed task was stored with; the result path rebuilds the
    /// original code from it.
    failure: Option<(ErrorCode, String)>,
    cancel: CancellationToken,
    rev: watch::Sender<u64>,
    /// The `tools/call` id and session this task was spawned from.
    origin: (Option<RequestId>, Option<Uuid>),
}

/// The reference task store: per-session, in memory.
///
/// Waiters subscribe to a per-task revision channel; every status change,
/// stored result or cancellation bumps the revision and wakes all of them.
/// Entries are retained `ttl` milliseconds from creation, then a janitor
/// cancels (when still active) and drops them.
#[derive(Default)]
pub(crate) struct InMemoryTaskStore {
    tasks: DashMap<String, TaskEntry>,
    order: Mutex<Vec<String>>,
}

impl InMemoryTaskStore {
    /// Mints a task in `working` status and schedules its retention janitor.
    pub(crate) fn create(
        self: &Arc<Self>,
        augmentation: TaskAugmentation,
        original_request_id: Option<RequestId>,
        session_id: Option<Uuid>,
    ) -> (Task, CancellationToken) {
        let task = Task::create(augmentation);
        let cancel = CancellationToken::new();
        let (rev, _) = watch::channel(0);

        self.tasks.insert(task.id.clone(), TaskEntry {
            task: task.clone(),
            result: None,
            failure: None,
            cancel: cancel.clone(),
            rev,
            origin: (original_request_id, session_id),
        });
        self.order.lock().expect("task order lock").push(task.id.clone());

        if let Some(ttl) = task.ttl {
            let store = Arc::downgrade(self);
            let id = task.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ttl)).await;
                if let Some(store) = store.upgrade() {
                    store.expire(&id);
                }
            });
        }

        (task, cancel)
    }

    /// Returns the current snapshot of a task.
    pub(crate) fn get(&self, id: &str) -> Result<Task, Error> {
        self.tasks
            .get(id)
            .map(|e| e.task.clone())
            .ok_or_else(|| Error::new(
                ErrorCode::InvalidParams,
                format!("Could not find task with id: {id}")))
    }

    /// One page of known tasks, in creation order.
    pub(crate) fn list(&self, cursor: Option<Cursor>) -> Page<Task> {
        let order = self.order.lock().expect("task order lock");
        let tasks: Vec<Task> = order
            .iter()
            .filter_map(|id| self.tasks.get(id).map(|e| e.task.clone()))
            .collect();
        tasks.paginate(cursor, crate::app::options::DEFAULT_PAGE_SIZE)
    }

    /// Moves a task into `status`; a no-op for unknown ids and for tasks
    /// already in a terminal state. Returns the updated snapshot when the
    /// transition happened.
    pub(crate) fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        msg: Option<String>,
    ) -> Option<Task> {
        let mut entry = self.tasks.get_mut(id)?;
        if !entry.task.transition(status, msg) {
            return None;
        }
        let task = entry.task.clone();
        entry.rev.send_modify(|n| *n += 1);
        Some(task)
    }

    /// Completes a task and persists its result payload.
    pub(crate) fn store_result(&self, id: &str, result: Value) -> Option<Task> {
        let mut entry = self.tasks.get_mut(id)?;
        if !entry.task.transition(TaskStatus::Completed, None) {
            return None;
        }
        entry.result = Some(result);
        let task = entry.task.clone();
        entry.rev.send_modify(|n| *n += 1);
        Some(task)
    }

    /// Fails a task, keeping the causing error's code.
    pub(crate) fn fail(&self, id: &str, err: Error) -> Option<Task> {
        let mut entry = self.tasks.get_mut(id)?;
        if !entry.task.transition(TaskStatus::Failed, Some(err.to_string())) {
            return None;
        }
        entry.failure = Some((err.code(), err.to_string()));
        let task = entry.task.clone();
        entry.rev.send_modify(|n| *n += 1);
        Some(task)
    }

    /// The error a failed task was stored with.
    pub(crate) fn failure(&self, id: &str) -> Option<Error> {
        self.tasks
            .get(id)?
            .failure
            .as_ref()
            .map(|(code, msg)| Error::new(*code, msg.clone()))
    }

    /// Returns the stored result of a completed task.
    pub(crate) fn get_result(&self, id: &str) -> Result<Value, Error> {
        let entry = self.tasks.get(id).ok_or_else(|| Error::new(
            ErrorCode::InvalidParams,
            format!("Could not find task with id: {id}")))?;
        entry.result.clone().ok_or_else(|| Error::new(
            ErrorCode::InvalidRequest,
            format!("Task {id} has no stored result")))
    }

    /// Cancels a non-terminal task. Idempotent: the first call returns the
    /// updated snapshot, later calls (and calls on terminal tasks) `None`.
    pub(crate) fn cancel(&self, id: &str, reason: Option<String>) -> Option<Task> {
        let mut entry = self.tasks.get_mut(id)?;
        if !entry.task.transition(TaskStatus::Cancelled, reason) {
            return None;
        }
        entry.cancel.cancel();
        let task = entry.task.clone();
        entry.rev.send_modify(|n| *n += 1);
        Some(task)
    }

    /// Resolves on the next update of the given task. Multiple waiters are
    /// fine; disposing the store wakes all of them.
    pub(crate) async fn wait_for_update(&self, id: &str) {
        let Some(mut rx) = self.tasks.get(id).map(|e| e.rev.subscribe()) else {
            return;
        };
        let _ = rx.changed().await;
    }

    /// Waits until the task reaches a terminal status.
    pub(crate) async fn wait_terminal(&self, id: &str) -> Result<Task, Error> {
        loop {
            let task = self.get(id)?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            self.wait_for_update(id).await;
        }
    }

    /// The request id and session a task was spawned from.
    pub(crate) fn origin(&self, id: &str) -> Option<(Option<RequestId>, Option<Uuid>)> {
        self.tasks.get(id).map(|e| e.origin.clone())
    }

    /// Drops every entry, waking all waiters; called on session close.
    pub(crate) fn dispose(&self) {
        self.tasks.clear();
        self.order.lock().expect("task order lock").clear();
    }

    /// Retention expiry: cancel when still active, then forget the task.
    fn expire(&self, id: &str) {
        if let Some(entry) = self.tasks.get(id) {
            if !entry.task.status.is_terminal() {
                entry.cancel.cancel();
            }
        }
        self.tasks.remove(id);
        self.order.lock().expect("task order lock").retain(|t| t != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Arc<InMemoryTaskStore> {
        Arc::new(InMemoryTaskStore::default())
    }

    #[tokio::test]
    async fn it_creates_working_tasks() {
        let store = store();
        let (task, _) = store.create(TaskAugmentation::default(), None, None);

        let fetched = store.get(&task.id).unwrap();
        assert_eq!(fetched.status, TaskStatus::Working);
    }

    #[tokio::test]
    async fn it_stores_results_only_for_completed_tasks() {
        let store = store();
        let (task, _) = store.create(TaskAugmentation::default(), None, None);

        let err = store.get_result(&task.id).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        store.store_result(&task.id, serde_json::json!({ "ok": true }));
        assert_eq!(store.get(&task.id).unwrap().status, TaskStatus::Completed);
        assert_eq!(store.get_result(&task.id).unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn it_preserves_failure_codes() {
        let store = store();
        let (task, _) = store.create(TaskAugmentation::default(), None, None);

        store.fail(&task.id, Error::new(ErrorCode::InvalidParams, "bad structured content"));

        let failed = store.get(&task.id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.status_msg.as_deref(), Some("bad structured content"));

        let err = store.failure(&task.id).unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
        assert_eq!(err.to_string(), "bad structured content");
    }

    #[tokio::test]
    async fn it_makes_cancel_idempotent() {
        let store = store();
        let (task, token) = store.create(TaskAugmentation::default(), None, None);

        assert!(store.cancel(&task.id, Some("stop".into())).is_some());
        assert!(token.is_cancelled());
        assert!(store.cancel(&task.id, None).is_none());
    }

    #[tokio::test]
    async fn it_refuses_transitions_out_of_terminal_states() {
        let store = store();
        let (task, _) = store.create(TaskAugmentation::default(), None, None);

        store.cancel(&task.id, None);
        assert!(store.update_status(&task.id, TaskStatus::Working, None).is_none());
        assert!(store.store_result(&task.id, Value::Null).is_none());
        assert_eq!(store.get(&task.id).unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn it_wakes_waiters_on_update() {
        let store = store();
        let (task, _) = store.create(TaskAugmentation::default(), None, None);

        let waiter = {
            let store = store.clone();
            let id = task.id.clone();
            tokio::spawn(async move { store.wait_terminal(&id).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.update_status(&task.id, TaskStatus::InputRequired, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.store_result(&task.id, Value::Null);

        let task = waiter.await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn it_expires_tasks_after_ttl() {
        let store = store();
        let (task, token) = store.create(
            TaskAugmentation { ttl: Some(50) }, None, None);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(token.is_cancelled());
        assert!(store.get(&task.id).is_err());
    }

    #[tokio::test]
    async fn it_lists_tasks_in_creation_order() {
        let store = store();
        let (a, _) = store.create(TaskAugmentation::default(), None, None);
        let (b, _) = store.create(TaskAugmentation::default(), None, None);

        let page = store.list(None);
        assert_eq!(page.items[0].id, a.id);
        assert_eq!(page.items[1].id, b.id);
    }
}
