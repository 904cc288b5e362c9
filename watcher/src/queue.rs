//! Ordered hand-off between the wait thread and the drain.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::event::ChangeEvent;

/// FIFO of change events, bounded only by memory.
///
/// Pushing never fails and only waits for the lock. A slow consumer makes the
/// queue grow instead of stalling the wait thread, since a stalled wait
/// thread loses native records. Every operation takes the single lock, so a
/// drain observes each concurrent push either completely or not at all.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<ChangeEvent>>,
    pushed: AtomicU64,
    drained: AtomicU64,
    high_water: AtomicUsize,
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn push(&self, event: ChangeEvent) {
        let mut events = self.lock();
        events.push_back(event);
        self.record_push(1, events.len());
    }

    /// Append several events under one lock so they stay contiguous.
    pub fn push_batch(&self, batch: impl IntoIterator<Item = ChangeEvent>) {
        let mut events = self.lock();
        let before = events.len();
        events.extend(batch);
        let added = events.len() - before;
        if added > 0 {
            self.record_push(added, events.len());
        }
    }

    /// Remove the oldest event, if any. Never blocks on an empty queue.
    pub fn try_pop(&self) -> Option<ChangeEvent> {
        let event = self.lock().pop_front();
        if event.is_some() {
            self.drained.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Remove every queued event, oldest first.
    pub fn drain_all(&self) -> Vec<ChangeEvent> {
        let taken = std::mem::take(&mut *self.lock());
        self.drained
            .fetch_add(taken.len() as u64, Ordering::Relaxed);
        taken.into()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard every queued event and return how many there were.
    pub fn clear(&self) -> usize {
        let mut events = self.lock();
        let discarded = events.len();
        events.clear();
        discarded
    }

    /// Get statistics about the queue.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.len(),
            pushed: self.pushed.load(Ordering::Relaxed),
            drained: self.drained.load(Ordering::Relaxed),
            high_water: self.high_water.load(Ordering::Relaxed),
        }
    }

    fn record_push(&self, count: usize, depth: usize) {
        self.pushed.fetch_add(count as u64, Ordering::Relaxed);
        self.high_water.fetch_max(depth, Ordering::Relaxed);
    }

    // A panic elsewhere while holding the lock leaves the deque intact, so
    // keep using it.
    fn lock(&self) -> MutexGuard<'_, VecDeque<ChangeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Statistics about an event queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Events currently queued.
    pub queued: usize,

    /// Events pushed since creation.
    pub pushed: u64,

    /// Events removed by pops and drains since creation.
    pub drained: u64,

    /// Largest depth the queue has reached.
    pub high_water: usize,
}
