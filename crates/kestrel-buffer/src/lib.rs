//! Buffer pool management for Kestrel.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool over any `DiskIo` device
//! - LRU-K eviction policy for cache management
//! - Extendible hash table mapping resident pages to frames
//! - Pin counting for concurrent access
//! - Dirty page tracking for write-back

mod frame;
mod hash_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use hash_table::{ExtendibleHashTable, HashTable};
pub use kestrel_common::BufferPoolConfig;
pub use pool::{BufferPool, BufferPoolStats, PageReadGuard, PageWriteGuard};
pub use replacer::{LruKReplacer, Replacer};
