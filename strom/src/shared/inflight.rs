//! Tracking of inbound requests currently being handled

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::types::RequestId;

/// Cancellation registry for inbound requests.
///
/// A peer `notifications/cancelled` fires the token of the named request;
/// unknown ids are ignored, which makes cancellation idempotent.
#[derive(Default)]
pub(crate) struct InflightRequests {
    inner: DashMap<RequestId, CancellationToken>,
}

impl InflightRequests {
    /// Starts tracking an inbound request under the session-wide parent token.
    pub(crate) fn track(&self, id: &RequestId, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        self.inner.insert(id.clone(), token.clone());
        token
    }

    /// Cancels the handler of an inbound request, if it is still running.
    pub(crate) fn cancel(&self, id: &RequestId) {
        if let Some(entry) = self.inner.get(id) {
            entry.cancel();
        }
    }

    /// Stops tracking a finished request.
    pub(crate) fn complete(&self, id: &RequestId) {
        self.inner.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn it_cancels_tracked_requests() {
        let inflight = InflightRequests::default();
        let parent = CancellationToken::new();
        let token = inflight.track(&RequestId::Number(1), &parent);

        inflight.cancel(&RequestId::Number(1));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn it_ignores_unknown_ids() {
        let inflight = InflightRequests::default();
        inflight.cancel(&RequestId::Number(9));
        // idempotent; nothing to observe
    }

    #[tokio::test]
    async fn it_cancels_children_through_parent() {
        let inflight = InflightRequests::default();
        let parent = CancellationToken::new();
        let token = inflight.track(&RequestId::Number(2), &parent);

        parent.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn it_stops_tracking_on_complete() {
        let inflight = InflightRequests::default();
        let parent = CancellationToken::new();
        let token = inflight.track(&RequestId::Number(3), &parent);

        inflight.complete(&RequestId::Number(3));
        inflight.cancel(&RequestId::Number(3));
        assert!(!token.is_cancelled());
    }
}
