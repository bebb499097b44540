//! Per-task queues of nested requests
//!
//! A task handler that needs input enqueues its outgoing request here
//! together with a resolver; the `tasks/result` service loop is the single
//! consumer that pulls entries, puts them on the wire and feeds the reply
//! back through the resolver. Within one task the queue serializes nested
//! requests.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{oneshot, Notify};

use crate::error::Error;
use crate::types::RequestId;

/// One nested request waiting to be relayed to the requester.
pub(crate) struct QueuedRequest {
    /// The method of the nested request, e.g. `elicitation/create`.
    pub(crate) method: String,

    /// The request params, already tagged with the related-task metadata.
    pub(crate) params: Value,

    /// Receives the peer's reply (or the relay failure).
    pub(crate) resolver: oneshot::Sender<Result<Value, Error>>,

    /// When the handler enqueued the request.
    pub(crate) queued_at: DateTime<Utc>,

    /// The `tools/call` id of the task, for diagnostics.
    pub(crate) original_request_id: Option<RequestId>,
}

#[derive(Default)]
struct TaskQueue {
    buf: VecDeque<QueuedRequest>,
    ready: Arc<Notify>,
}

/// The per-task FIFO registry.
#[derive(Default)]
pub(crate) struct TaskMessageQueue {
    inner: DashMap<String, TaskQueue>,
}

impl TaskMessageQueue {
    /// Appends a nested request to the task's queue.
    ///
    /// The notify permit is stored, so a waiter that subscribes after this
    /// call still observes the enqueue.
    pub(crate) fn enqueue(&self, task_id: &str, request: QueuedRequest) {
        let mut entry = self.inner.entry(task_id.to_string()).or_default();
        entry.buf.push_back(request);
        entry.ready.notify_one();
    }

    /// Removes and returns the oldest queued request, if any.
    pub(crate) fn dequeue(&self, task_id: &str) -> Option<QueuedRequest> {
        self.inner.get_mut(task_id)?.buf.pop_front()
    }

    /// Waits until a queued request is available and returns it.
    pub(crate) async fn wait_for_message(&self, task_id: &str) -> QueuedRequest {
        loop {
            let ready = self
                .inner
                .entry(task_id.to_string())
                .or_default()
                .ready
                .clone();

            let notified = ready.notified();
            if let Some(request) = self.dequeue(task_id) {
                return request;
            }
            notified.await;
        }
    }

    /// Drops a task's queue; pending resolvers observe a closed channel.
    pub(crate) fn remove(&self, task_id: &str) {
        self.inner.remove(task_id);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    fn request(method: &str) -> (QueuedRequest, oneshot::Receiver<Result<Value, Error>>) {
        let (tx, rx) = oneshot::channel();
        (
            QueuedRequest {
                method: method.into(),
                params: json!({}),
                resolver: tx,
                queued_at: Utc::now(),
                original_request_id: None,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn it_preserves_fifo_order() {
        let queue = TaskMessageQueue::default();
        let (first, _rx1) = request("elicitation/create");
        let (second, _rx2) = request("sampling/createMessage");

        queue.enqueue("t1", first);
        queue.enqueue("t1", second);

        assert_eq!(queue.dequeue("t1").unwrap().method, "elicitation/create");
        assert_eq!(queue.dequeue("t1").unwrap().method, "sampling/createMessage");
        assert!(queue.dequeue("t1").is_none());
    }

    #[tokio::test]
    async fn it_wakes_waiters_on_enqueue() {
        let queue = Arc::new(TaskMessageQueue::default());

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait_for_message("t1").await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let (req, _rx) = request("elicitation/create");
        queue.enqueue("t1", req);

        let got = waiter.await.unwrap();
        assert_eq!(got.method, "elicitation/create");
    }

    #[tokio::test]
    async fn it_returns_buffered_message_without_waiting() {
        let queue = TaskMessageQueue::default();
        let (req, _rx) = request("elicitation/create");
        queue.enqueue("t1", req);

        let got = queue.wait_for_message("t1").await;
        assert_eq!(got.method, "elicitation/create");
    }

    #[tokio::test]
    async fn it_keeps_tasks_isolated() {
        let queue = TaskMessageQueue::default();
        let (req, _rx) = request("elicitation/create");
        queue.enqueue("t1", req);

        assert!(queue.dequeue("t2").is_none());
        assert!(queue.dequeue("t1").is_some());
    }

    #[tokio::test]
    async fn it_closes_resolvers_on_remove() {
        let queue = TaskMessageQueue::default();
        let (req, rx) = request("elicitation/create");
        queue.enqueue("t1", req);
        queue.remove("t1");

        assert!(rx.await.is_err());
    }
}
