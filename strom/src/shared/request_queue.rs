//! Tracking of outbound requests awaiting responses

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, ErrorCode};
use crate::types::{notification::ProgressNotificationParams, ProgressToken, RequestId, Response};

/// The receiving side of one pending request.
pub(crate) struct PendingReceiver {
    pub(crate) response: oneshot::Receiver<Result<Response, Error>>,
    pub(crate) progress: mpsc::UnboundedReceiver<ProgressNotificationParams>,
}

struct PendingEntry {
    response: oneshot::Sender<Result<Response, Error>>,
    progress: mpsc::UnboundedSender<ProgressNotificationParams>,
}

/// The pending-requests table of one session.
///
/// Every outbound request is registered here before it hits the wire and is
/// resolved exactly once: by a response, an error, a timeout, a cancellation
/// or session close.
#[derive(Default)]
pub(crate) struct RequestQueue {
    pending: DashMap<RequestId, PendingEntry>,
}

impl RequestQueue {
    /// Registers a pending request and returns its receiving side.
    pub(crate) fn push(&self, id: &RequestId) -> PendingReceiver {
        let (resp_tx, resp_rx) = oneshot::channel();
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();

        self.pending.insert(id.clone(), PendingEntry {
            response: resp_tx,
            progress: progress_tx,
        });

        PendingReceiver {
            response: resp_rx,
            progress: progress_rx,
        }
    }

    /// Resolves a pending request; a late or unknown id is dropped.
    pub(crate) fn complete(&self, id: &RequestId, outcome: Result<Response, Error>) {
        if let Some((_, entry)) = self.pending.remove(id) {
            if entry.response.send(outcome).is_err() {
                tracing::debug!(logger = "strom", "Awaiter for request {id} already gone");
            }
        }
    }

    /// Routes a progress notification to the request its token refers to.
    pub(crate) fn progress(&self, params: ProgressNotificationParams) {
        let id = params.token.request_id();
        if let Some(entry) = self.pending.get(&id) {
            let _ = entry.progress.send(params);
        }
    }

    /// Whether a progress token refers to a request still in flight.
    pub(crate) fn is_pending(&self, token: &ProgressToken) -> bool {
        self.pending.contains_key(&token.request_id())
    }

    /// Drops a pending entry without resolving it; the awaiter produced its
    /// own outcome (timeout or cancellation).
    pub(crate) fn remove(&self, id: &RequestId) {
        self.pending.remove(id);
    }

    /// Fails every pending request; called on session close.
    pub(crate) fn fail_all(&self, code: ErrorCode) {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.complete(&id, Err(Error::from(code)));
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[tokio::test]
    async fn it_completes_pending_request() {
        let queue = RequestQueue::default();
        let id = RequestId::Number(1);

        let pending = queue.push(&id);
        queue.complete(&id, Ok(Response::success(id.clone(), json!({ "ok": true }))));

        let resp = pending.response.await.unwrap().unwrap();
        assert_eq!(resp.result, json!({ "ok": true }));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn it_drops_late_responses() {
        let queue = RequestQueue::default();
        let id = RequestId::Number(1);

        queue.complete(&id, Ok(Response::empty(id.clone())));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn it_routes_progress_by_token() {
        let queue = RequestQueue::default();
        let id = RequestId::Number(5);

        let mut pending = queue.push(&id);
        queue.progress(ProgressNotificationParams {
            token: ProgressToken::Number(5),
            progress: 0.3,
            total: Some(1.0),
            message: None,
        });

        let event = pending.progress.recv().await.unwrap();
        assert_eq!(event.progress, 0.3);
        // The entry stays pending until the response arrives.
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn it_fails_all_on_close() {
        let queue = RequestQueue::default();
        let first = queue.push(&RequestId::Number(1));
        let second = queue.push(&RequestId::Number(2));

        queue.fail_all(ErrorCode::ConnectionClosed);

        for pending in [first, second] {
            let outcome = pending.response.await.unwrap();
            assert_eq!(outcome.unwrap_err().code(), ErrorCode::ConnectionClosed);
        }
    }
}
