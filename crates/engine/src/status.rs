use preranker_types::EventCursor;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

/// Shared source of the engine's operational status. Cheap to clone.
#[derive(Clone, Default)]
pub struct StatusHandle {
    inner: Arc<StatusInner>,
}

#[derive(Default)]
struct StatusInner {
    active_intents: AtomicUsize,
    // 0 means "never polled".
    last_poll_ts: AtomicU64,
    cursor: Mutex<Option<EventCursor>>,
}

/// A point-in-time view of the engine's operational status.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Intents currently accepting solutions.
    pub active_intent_count: usize,
    /// The last durably persisted cursor.
    pub current_cursor: Option<EventCursor>,
    /// When the ingestor last completed an event poll, milliseconds since
    /// the epoch. Absent before the first poll.
    pub last_poll_ts: Option<u64>,
}

impl StatusHandle {
    pub(crate) fn set_active_intents(&self, count: usize) {
        self.inner.active_intents.store(count, Ordering::Relaxed);
    }

    pub(crate) fn poll_observed(&self, now_ms: u64) {
        self.inner.last_poll_ts.store(now_ms, Ordering::Relaxed);
    }

    pub(crate) fn set_cursor(&self, cursor: EventCursor) {
        *self.inner.cursor.lock().expect("status lock poisoned") = Some(cursor);
    }

    /// The current status.
    pub fn snapshot(&self) -> StatusSnapshot {
        let last_poll = self.inner.last_poll_ts.load(Ordering::Relaxed);
        StatusSnapshot {
            active_intent_count: self.inner.active_intents.load(Ordering::Relaxed),
            current_cursor: self
                .inner
                .cursor
                .lock()
                .expect("status lock poisoned")
                .clone(),
            last_poll_ts: (last_poll > 0).then_some(last_poll),
        }
    }
}
