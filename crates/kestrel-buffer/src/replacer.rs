//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Marks a frame as evictable (unpinned) or not.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction and forgets everything about it.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Discards all tracked state for a frame.
    fn remove(&self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU-K replacement.
///
/// Frames with fewer than `k` recorded accesses have an infinite backward
/// k-distance and are always evicted before frames with a full history.
/// Among them, the frame whose first recorded access is oldest goes first.
/// Frames with `k` or more accesses are ranked by their most recent access.
///
/// Every operation advances a logical clock that serves as the timestamp
/// source. Frame ids at or above the capacity are ignored.
pub struct LruKReplacer {
    /// Internal state protected by mutex.
    inner: Mutex<LruKReplacerInner>,
}

/// Access history of one tracked frame.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AccessRecord {
    /// Fewer than `k` accesses so far, oldest first.
    History(Vec<u64>),
    /// At least `k` accesses; only the latest timestamp is kept.
    Mature(u64),
}

struct LruKReplacerInner {
    /// Total number of frames.
    num_frames: usize,
    /// History depth.
    k: usize,
    /// Logical clock.
    current_timestamp: u64,
    /// Per-frame access records.
    records: HashMap<FrameId, AccessRecord>,
    /// Frames currently flagged evictable.
    evictable: HashSet<FrameId>,
}

impl LruKReplacerInner {
    fn tick(&mut self) -> u64 {
        self.current_timestamp += 1;
        self.current_timestamp
    }

    fn in_range(&self, frame_id: FrameId) -> bool {
        frame_id.index() < self.num_frames
    }

    /// Oldest evictable frame by the given key among records matched by `select`.
    fn oldest_by<F>(&self, select: F) -> Option<FrameId>
    where
        F: Fn(&AccessRecord) -> Option<u64>,
    {
        self.evictable
            .iter()
            .filter_map(|frame_id| {
                let record = self.records.get(frame_id)?;
                select(record).map(|ts| (ts, *frame_id))
            })
            .min()
            .map(|(_, frame_id)| frame_id)
    }
}

impl LruKReplacer {
    /// Creates a replacer tracking frames `0..num_frames` with history depth `k`.
    pub fn new(num_frames: usize, k: usize) -> Self {
        Self {
            inner: Mutex::new(LruKReplacerInner {
                num_frames,
                k,
                current_timestamp: 0,
                records: HashMap::new(),
                evictable: HashSet::new(),
            }),
        }
    }

    /// Returns the total capacity.
    pub fn capacity(&self) -> usize {
        self.inner.lock().num_frames
    }

    /// Returns the history depth.
    pub fn k(&self) -> usize {
        self.inner.lock().k
    }
}

impl Replacer for LruKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let now = inner.tick();
        if !inner.in_range(frame_id) {
            return;
        }

        let k = inner.k;
        let record = inner
            .records
            .entry(frame_id)
            .or_insert_with(|| AccessRecord::History(Vec::with_capacity(k)));

        let promote = match record {
            AccessRecord::Mature(last) => {
                *last = now;
                false
            }
            AccessRecord::History(history) => {
                history.push(now);
                history.len() >= k
            }
        };
        if promote {
            *record = AccessRecord::Mature(now);
        }
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        inner.tick();

        if evictable {
            // Only frames with at least one recorded access can become candidates
            if inner.records.contains_key(&frame_id) {
                inner.evictable.insert(frame_id);
            }
        } else {
            inner.evictable.remove(&frame_id);
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        inner.tick();

        let victim = inner
            .oldest_by(|record| match record {
                AccessRecord::History(history) => history.first().copied(),
                AccessRecord::Mature(_) => None,
            })
            .or_else(|| {
                inner.oldest_by(|record| match record {
                    AccessRecord::Mature(last) => Some(*last),
                    AccessRecord::History(_) => None,
                })
            })?;

        inner.records.remove(&victim);
        inner.evictable.remove(&victim);
        trace!(%victim, "lru-k victim selected");
        Some(victim)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        inner.tick();
        inner.records.remove(&frame_id);
        inner.evictable.remove(&frame_id);
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable.len()
    }
}
