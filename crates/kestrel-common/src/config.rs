//! Configuration structures for Kestrel.

use crate::error::{KestrelError, Result};
use crate::page::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use sysinfo::System;

/// Default lookback depth for the LRU-K replacer.
pub const DEFAULT_REPLACER_K: usize = 10;

/// Default bucket capacity of the page table.
pub const DEFAULT_BUCKET_SIZE: usize = 4;

/// Configuration for the buffer pool. Fixed for the lifetime of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub pool_size: usize,
    /// History depth `k` of the LRU-K replacer.
    pub replacer_k: usize,
    /// Entries per bucket in the extendible hash page table.
    pub bucket_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1024,
            replacer_k: DEFAULT_REPLACER_K,
            bucket_size: DEFAULT_BUCKET_SIZE,
        }
    }
}

impl BufferPoolConfig {
    /// Creates a config with the given pool size and default k and bucket size.
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Default::default()
        }
    }

    /// Creates a config sized to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames so small machines still get a useful cache.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let pool_size = (target_bytes / PAGE_SIZE).max(1_000);

        Self::with_pool_size(pool_size)
    }

    /// Rejects zero-valued parameters.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("pool_size", self.pool_size),
            ("replacer_k", self.replacer_k),
            ("bucket_size", self.bucket_size),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(KestrelError::InvalidParameter {
                    name: name.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Returns the total buffer pool size in bytes.
    pub fn buffer_pool_size_bytes(&self) -> usize {
        self.pool_size * PAGE_SIZE
    }
}

/// Storage configuration for the page cache and its data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the data file.
    pub data_dir: PathBuf,
    /// Enable fsync after every page write.
    pub fsync_enabled: bool,
    /// Buffer pool parameters.
    pub buffer_pool: BufferPoolConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
            buffer_pool: BufferPoolConfig::default(),
        }
    }
}
