use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::models::event::TriggerEvent;

#[derive(Debug, Clone)]
pub struct DeferredEvent {
    pub event: TriggerEvent,
    pub release_at: DateTime<Utc>,
    pub deferred_at: DateTime<Utc>,
}

/// Events held back by quiet hours, waiting to be replayed through the full pipeline.
///
/// One entry per correlation key: deferring the same event again replaces it.
#[derive(Default)]
pub struct DeferredQueue {
    entries: Mutex<Vec<DeferredEvent>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: TriggerEvent, release_at: DateTime<Utc>, now: DateTime<Utc>) {
        let key = event.correlation_key();
        let mut entries = self.entries.lock();

        entries.retain(|e| e.event.correlation_key() != key);
        entries.push(DeferredEvent {
            event,
            release_at,
            deferred_at: now,
        });

        debug!(correlation_key = %key, release_at = %release_at, queued = entries.len(), "Event deferred");
    }

    /// Removes and returns every event whose release time has passed.
    pub fn release_due(&self, now: DateTime<Utc>) -> Vec<TriggerEvent> {
        let mut entries = self.entries.lock();
        let (due, waiting): (Vec<_>, Vec<_>) =
            entries.drain(..).partition(|e| e.release_at <= now);
        *entries = waiting;

        due.into_iter().map(|e| e.event).collect()
    }

    pub fn next_release_at(&self) -> Option<DateTime<Utc>> {
        self.entries.lock().iter().map(|e| e.release_at).min()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
