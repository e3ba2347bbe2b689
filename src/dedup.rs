use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

use crate::activity::{ActivityItem, ActivityKey, ActivityKind, ActivitySink};

/// Keys remembered per (chat, kind) bucket
pub const DEFAULT_RETENTION: usize = 100;

#[derive(Debug, Default)]
struct Bucket {
    /// Message ids in insertion order
    order: VecDeque<i64>,
    /// Highest message id evicted so far
    floor: Option<i64>,
}

#[derive(Debug, Default)]
struct DedupState {
    seen: HashSet<ActivityKey>,
    buckets: HashMap<(i64, ActivityKind), Bucket>,
    emitted: u64,
    suppressed: u64,
}

/// Merges polled and live activity into one feed without repeats.
///
/// The membership check, the insert and the hand-off to the sink happen under
/// one lock, so two paths observing the same item never both emit it.
///
/// Memory is bounded: each (chat, kind) bucket keeps the most recent
/// `retention` keys. Evicted ids raise the bucket's floor and anything at or
/// below the floor counts as already seen. Message ids grow monotonically per
/// chat, so only old history ever lands there.
pub struct ActivityDeduper {
    sink: Arc<dyn ActivitySink>,
    retention: usize,
    state: Mutex<DedupState>,
}

impl ActivityDeduper {
    pub fn new(sink: Arc<dyn ActivitySink>, retention: usize) -> Self {
        Self {
            sink,
            retention: retention.max(1),
            state: Mutex::new(DedupState::default()),
        }
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    fn state(&self) -> MutexGuard<'_, DedupState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Emits `item` if its key was not seen before. Returns true if emitted.
    pub fn observe(&self, item: &ActivityItem) -> bool {
        let key = item.key();
        let mut guard = self.state();
        let state = &mut *guard;

        if state.seen.contains(&key) {
            state.suppressed += 1;
            trace!(
                "Duplicate {kind} {message_id} in {channel_id}",
                kind = key.kind,
                message_id = key.message_id,
                channel_id = key.channel_id
            );
            return false;
        }

        let bucket = state
            .buckets
            .entry((key.channel_id, key.kind))
            .or_default();

        if bucket.floor.is_some_and(|floor| key.message_id <= floor) {
            state.suppressed += 1;
            trace!(
                "Ignoring old {kind} {message_id} in {channel_id}",
                kind = key.kind,
                message_id = key.message_id,
                channel_id = key.channel_id
            );
            return false;
        }

        bucket.order.push_back(key.message_id);
        let evicted = if bucket.order.len() > self.retention {
            bucket.order.pop_front()
        } else {
            None
        };
        if let Some(old_id) = evicted {
            bucket.floor = Some(bucket.floor.map_or(old_id, |floor| floor.max(old_id)));
        }

        state.seen.insert(key);
        if let Some(old_id) = evicted {
            state.seen.remove(&ActivityKey {
                message_id: old_id,
                ..key
            });
        }
        state.emitted += 1;

        self.sink.emit(item);
        true
    }

    pub fn emitted(&self) -> u64 {
        self.state().emitted
    }

    pub fn suppressed(&self) -> u64 {
        self.state().suppressed
    }

    /// Number of keys currently remembered
    pub fn tracked_keys(&self) -> usize {
        self.state().seen.len()
    }
}
