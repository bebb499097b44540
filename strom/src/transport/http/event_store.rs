//! Append-only event log backing SSE resumption

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::{Error, ErrorCode};
use crate::types::Message;

/// One recorded outbound message.
#[derive(Clone, Debug)]
pub(crate) struct EventStoreEntry {
    /// Monotonically increasing within the session; ids start at 1.
    pub(crate) id: u64,

    /// The SSE stream the entry was written to.
    pub(crate) stream_id: String,

    /// The recorded message.
    pub(crate) message: Message,
}

/// The reference in-memory event store of one session.
///
/// Ids are globally ordered within the session. Replay returns the entries
/// of the cursor's stream with ids strictly after the cursor, ascending.
/// With a retention bound, old entries are discarded and replay below the
/// retained window is an unrecoverable error.
pub struct InMemoryEventStore {
    counter: AtomicU64,
    entries: RwLock<VecDeque<EventStoreEntry>>,
    retention: Option<usize>,
}

impl InMemoryEventStore {
    pub(crate) fn new(retention: Option<usize>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            entries: RwLock::new(VecDeque::new()),
            retention,
        }
    }

    /// Records a message on a stream, returning its event id.
    pub(crate) fn append(&self, stream_id: &str, message: &Message) -> u64 {
        let id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.write().expect("event store lock");

        entries.push_back(EventStoreEntry {
            id,
            stream_id: stream_id.into(),
            message: message.clone(),
        });

        if let Some(retention) = self.retention {
            while entries.len() > retention {
                entries.pop_front();
            }
        }
        id
    }

    /// Returns the entries of the cursor's stream with `id > cursor`, in
    /// ascending order.
    ///
    /// A cursor ahead of everything recorded yields an empty replay; one
    /// that fell below the retained window is unrecoverable.
    pub(crate) fn replay_after(&self, cursor: u64) -> Result<Vec<EventStoreEntry>, Error> {
        let entries = self.entries.read().expect("event store lock");

        if cursor >= self.counter.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }

        let Some(at_cursor) = entries.iter().find(|e| e.id == cursor) else {
            return Err(Error::new(
                ErrorCode::InvalidRequest,
                format!("Event {cursor} is no longer retained; resumption is not possible")));
        };

        let stream_id = at_cursor.stream_id.clone();
        Ok(entries
            .iter()
            .filter(|e| e.id > cursor && e.stream_id == stream_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::types::Notification;
    use super::*;

    fn message(method: &str) -> Message {
        Notification::new(method, None).into()
    }

    #[test]
    fn it_assigns_monotonic_ids() {
        let store = InMemoryEventStore::new(None);
        assert_eq!(store.append("s1", &message("a")), 1);
        assert_eq!(store.append("s1", &message("b")), 2);
        assert_eq!(store.append("s2", &message("c")), 3);
    }

    #[test]
    fn it_replays_strictly_after_the_cursor() {
        let store = InMemoryEventStore::new(None);
        for method in ["a", "b", "c"] {
            store.append("s1", &message(method));
        }

        let replayed = store.replay_after(2).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].id, 3);
    }

    #[test]
    fn it_replays_only_the_cursors_stream() {
        let store = InMemoryEventStore::new(None);
        store.append("s1", &message("a"));
        store.append("s2", &message("b"));
        store.append("s1", &message("c"));

        let replayed = store.replay_after(1).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].id, 3);
    }

    #[test]
    fn it_returns_empty_replay_for_a_current_cursor() {
        let store = InMemoryEventStore::new(None);
        store.append("s1", &message("a"));

        assert!(store.replay_after(1).unwrap().is_empty());
        assert!(store.replay_after(9).unwrap().is_empty());
    }

    #[test]
    fn it_rejects_cursors_below_the_retained_window() {
        let store = InMemoryEventStore::new(Some(2));
        for method in ["a", "b", "c", "d"] {
            store.append("s1", &message(method));
        }

        let err = store.replay_after(1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        assert_eq!(store.replay_after(3).unwrap().len(), 1);
    }
}
