//! Extendible hash table used as the buffer pool page table.
//!
//! The directory holds `2^global_depth` slots, each naming a bucket in an
//! arena. A bucket with local depth `d` is shared by every slot whose low `d`
//! bits match. When a bucket overflows it splits on its next hash bit; if its
//! local depth already equals the global depth, the directory doubles first
//! by copying its slots into the new upper half.

use parking_lot::Mutex;
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use tracing::trace;

/// Minimal key/value map interface.
pub trait HashTable<K, V> {
    /// Returns a copy of the value stored for `key`.
    fn find(&self, key: &K) -> Option<V>;

    /// Inserts `key`, overwriting the value if the key is already present.
    fn insert(&self, key: K, value: V);

    /// Removes `key`. Returns false if it was absent.
    fn remove(&self, key: &K) -> bool;
}

struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn position(&self, key: &K) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }
}

struct Directory<K, V> {
    global_depth: u32,
    /// Directory slots, each an index into `buckets`.
    slots: Vec<usize>,
    /// Bucket arena. Buckets are never freed.
    buckets: Vec<Bucket<K, V>>,
}

impl<K, V> Directory<K, V> {
    #[inline]
    fn slot_of(&self, hash: u64) -> usize {
        let mask = (1u64 << self.global_depth) - 1;
        (hash & mask) as usize
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        self.slots[self.slot_of(hash)]
    }

    /// Doubles the directory. The new upper half mirrors the lower half.
    fn grow(&mut self) {
        self.slots.extend_from_within(..);
        self.global_depth += 1;
    }

    /// Splits `bucket` on its next hash bit and repoints the slots that
    /// referenced it.
    fn split<F>(&mut self, bucket: usize, hash_of: F)
    where
        F: Fn(&K) -> u64,
    {
        let depth = self.buckets[bucket].local_depth;
        let split_bit = 1u64 << depth;

        let items = std::mem::take(&mut self.buckets[bucket].items);
        let (high, low): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|(key, _)| hash_of(key) & split_bit != 0);

        self.buckets[bucket] = Bucket {
            local_depth: depth + 1,
            items: low,
        };
        let high_bucket = self.buckets.len();
        self.buckets.push(Bucket {
            local_depth: depth + 1,
            items: high,
        });

        for (slot, target) in self.slots.iter_mut().enumerate() {
            if *target == bucket && slot as u64 & split_bit != 0 {
                *target = high_bucket;
            }
        }
    }
}

/// Thread-safe extendible hash table.
///
/// A single latch serializes every lookup and mutation.
pub struct ExtendibleHashTable<K, V, S = RandomState> {
    bucket_size: usize,
    hash_builder: S,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V, RandomState>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Creates a table whose buckets hold at most `bucket_size` entries.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, RandomState::new())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    /// Creates a table using `hash_builder` to hash keys.
    ///
    /// Splitting only separates keys whose hashes differ, so `hash_builder`
    /// must not give more than `bucket_size` distinct keys the same 64-bit
    /// hash; `insert` panics on such a key instead of growing without bound.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_size` is zero.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be at least 1");
        Self {
            bucket_size,
            hash_builder,
            inner: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![0],
                buckets: vec![Bucket {
                    local_depth: 0,
                    items: Vec::with_capacity(bucket_size),
                }],
            }),
        }
    }

    #[inline]
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    /// Number of hash bits used to index the directory.
    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket behind directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> Option<u32> {
        let dir = self.inner.lock();
        let bucket = *dir.slots.get(dir_index)?;
        Some(dir.buckets[bucket].local_depth)
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Maximum entries per bucket.
    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Number of entries in the table.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .buckets
            .iter()
            .map(|bucket| bucket.items.len())
            .sum()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, S> HashTable<K, V> for ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    V: Clone,
    S: BuildHasher,
{
    fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash(key);
        let dir = self.inner.lock();
        let bucket = &dir.buckets[dir.bucket_of(hash)];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    fn insert(&self, key: K, value: V) {
        let hash = self.hash(&key);
        let mut dir = self.inner.lock();

        let target = dir.bucket_of(hash);
        if let Some(pos) = dir.buckets[target].position(&key) {
            dir.buckets[target].items[pos].1 = value;
            return;
        }

        loop {
            let target = dir.bucket_of(hash);
            if dir.buckets[target].items.len() < self.bucket_size {
                dir.buckets[target].items.push((key, value));
                return;
            }

            assert!(
                dir.buckets[target].items.iter().any(|(k, _)| self.hash(k) != hash),
                "more than bucket_size keys share the same 64-bit hash"
            );
            if dir.buckets[target].local_depth == dir.global_depth {
                dir.grow();
                trace!(global_depth = dir.global_depth, "page table directory doubled");
            }
            dir.split(target, |k| self.hash(k));
        }
    }

    fn remove(&self, key: &K) -> bool {
        let hash = self.hash(key);
        let mut dir = self.inner.lock();
        let target = dir.bucket_of(hash);
        let bucket = &mut dir.buckets[target];
        match bucket.position(key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }
}
