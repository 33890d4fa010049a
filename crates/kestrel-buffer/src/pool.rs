//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::hash_table::{ExtendibleHashTable, HashTable};
use crate::replacer::{LruKReplacer, Replacer};
use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::{BufferPoolConfig, KestrelError, Result};
use kestrel_storage::{DiskIo, LogManager};
use parking_lot::{Mutex, RwLockReadGuard, RwLockWriteGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// State guarded by the pool latch.
struct PoolState {
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping (extendible hash table)
/// - Free frame list, always preferred over eviction
/// - LRU-K replacement for choosing victims
/// - Pin counting; a pinned frame is never evicted
/// - Synchronous write-back of dirty victims through `DiskIo`
///
/// Bookkeeping runs under the pool latch, which is always taken before the
/// page table or replacer latches. The latch is never held while waiting on
/// the data lock of a pinned frame: flushes pin their target and write it
/// after releasing the latch.
///
/// A successful `new_page` or `fetch_page` pins the page once and must be
/// balanced by exactly one `unpin_page`. The returned frame must not be used
/// after that unpin.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames, indexed by frame id.
    frames: Vec<BufferFrame>,
    /// Resident page ID to frame ID mapping.
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Page replacement policy.
    replacer: LruKReplacer,
    /// Backing device.
    disk: Arc<dyn DiskIo>,
    /// Write-ahead log hook. Not consulted yet.
    log_manager: Option<Arc<LogManager>>,
    /// Next page id to hand out, seeded from the device.
    next_page_id: AtomicU32,
    latch: Mutex<PoolState>,
}

impl BufferPool {
    /// Creates a new buffer pool over `disk`.
    pub fn new(config: BufferPoolConfig, disk: Arc<dyn DiskIo>) -> Result<Self> {
        Self::with_log_manager(config, disk, None)
    }

    /// Creates a new buffer pool with an optional log manager.
    pub fn with_log_manager(
        config: BufferPoolConfig,
        disk: Arc<dyn DiskIo>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Result<Self> {
        config.validate()?;
        let pool_size = config.pool_size;

        let frames: Vec<_> = (0..pool_size)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start in free list
        let free_list: VecDeque<_> = (0..pool_size).map(|i| FrameId(i as u32)).collect();
        let first_page_id = disk.num_pages();

        debug!(
            pool_size,
            first_page_id,
            replacer_k = config.replacer_k,
            bucket_size = config.bucket_size,
            "buffer pool created"
        );

        Ok(Self {
            page_table: ExtendibleHashTable::new(config.bucket_size),
            replacer: LruKReplacer::new(pool_size, config.replacer_k),
            config,
            frames,
            disk,
            log_manager,
            next_page_id: AtomicU32::new(first_page_id),
            latch: Mutex::new(PoolState { free_list }),
        })
    }

    #[inline]
    fn frame(&self, frame_id: FrameId) -> &BufferFrame {
        &self.frames[frame_id.index()]
    }

    /// Hands out the next page id.
    fn allocate_page(&self) -> PageId {
        PageId(self.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Writes a frame's bytes to its page on disk and clears the dirty flag.
    ///
    /// Only for frames nobody else can hold a data guard on: unpinned
    /// victims and pages being deleted.
    fn write_frame(&self, page_id: PageId, frame: &BufferFrame) -> Result<()> {
        let data = frame.read_data();
        self.disk.write_page(page_id, &data)?;
        frame.set_dirty(false);
        Ok(())
    }

    /// Obtains a frame for a new resident page.
    ///
    /// Tries the free list first, then asks the replacer for a victim. A
    /// dirty victim is written back before its page table entry and replacer
    /// history are dropped. The returned frame still holds the victim's bytes.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let victim = self.replacer.evict().ok_or(KestrelError::BufferPoolFull)?;
        let frame = self.frame(victim);

        if let Some(old_page) = frame.page_id() {
            if frame.is_dirty() {
                debug!(%victim, page_id = %old_page, "writing back dirty victim");
                if let Err(e) = self.write_frame(old_page, frame) {
                    warn!(%victim, page_id = %old_page, error = %e, "victim write-back failed");
                    // Victim stays resident and becomes a candidate again
                    self.replacer.record_access(victim);
                    self.replacer.set_evictable(victim, true);
                    return Err(e);
                }
            } else {
                debug!(%victim, page_id = %old_page, "evicting clean page");
            }
            self.page_table.remove(&old_page);
            self.replacer.remove(victim);
        }

        Ok(victim)
    }

    /// Makes `page_id` resident in `frame_id` with a single pin.
    fn install(&self, frame_id: FrameId, page_id: PageId) -> &BufferFrame {
        let frame = self.frame(frame_id);
        frame.set_page_id(Some(page_id));
        frame.set_dirty(false);
        frame.pin();

        self.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
        frame
    }

    /// Creates a new zeroed page and pins it.
    ///
    /// Returns `Err(KestrelError::BufferPoolFull)` when every frame is pinned.
    pub fn new_page(&self) -> Result<(PageId, &BufferFrame)> {
        let mut state = self.latch.lock();
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = self.allocate_page();
        self.frame(frame_id).reset();
        let frame = self.install(frame_id, page_id);

        trace!(%page_id, %frame_id, "new page");
        Ok((page_id, frame))
    }

    /// Fetches a page, reading it from disk if it is not resident, and pins it.
    ///
    /// Returns `Err(KestrelError::BufferPoolFull)` when the page is not
    /// resident and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<&BufferFrame> {
        if !page_id.is_valid() {
            return Err(KestrelError::PageNotFound {
                page_id: page_id.get(),
            });
        }

        let mut state = self.latch.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = self.frame(frame_id);
            frame.pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            trace!(%page_id, %frame_id, "page table hit");
            return Ok(frame);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = self.frame(frame_id);
        frame.reset();

        let loaded = {
            let mut data = frame.write_data();
            self.disk.read_page(page_id, &mut data)
        };
        if let Err(e) = loaded {
            warn!(%page_id, %frame_id, error = %e, "page load failed");
            frame.reset();
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        trace!(%page_id, %frame_id, "page table miss, loaded from disk");
        Ok(self.install(frame_id, page_id))
    }

    /// Releases one pin on a page.
    ///
    /// `is_dirty` is OR-ed into the page's dirty flag. When the pin count
    /// drops to zero the frame becomes an eviction candidate. Returns false
    /// if the page is not resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = self.frame(frame_id);
        let Some(remaining) = frame.unpin() else {
            return false;
        };

        if is_dirty {
            frame.set_dirty(true);
        }
        if remaining == 0 {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }

    /// Writes a resident page to disk whether or not it is dirty.
    ///
    /// Returns `Ok(false)` if the page is not resident. The write happens
    /// outside the pool latch, so it waits for any data guard another caller
    /// holds on the page without blocking the rest of the pool.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame_id = {
            let _state = self.latch.lock();
            let Some(frame_id) = self.page_table.find(&page_id) else {
                return Ok(false);
            };
            let frame = self.frame(frame_id);
            // Held for the write so the frame cannot be evicted or deleted
            frame.pin();
            self.replacer.set_evictable(frame_id, false);
            // A concurrent dirty unpin during the write sets it again
            frame.set_dirty(false);
            frame_id
        };

        let frame = self.frame(frame_id);
        let written = {
            let data = frame.read_data();
            self.disk.write_page(page_id, &data)
        };

        let _state = self.latch.lock();
        if let Err(e) = &written {
            warn!(%page_id, %frame_id, error = %e, "page flush failed");
            frame.set_dirty(true);
        }
        if frame.unpin() == Some(0) {
            self.replacer.set_evictable(frame_id, true);
        }
        written.map(|()| true)
    }

    /// Writes every resident page to disk.
    ///
    /// Pages resident when the call starts are flushed one at a time. Returns
    /// the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let resident: Vec<PageId> = {
            let _state = self.latch.lock();
            self.frames.iter().filter_map(BufferFrame::page_id).collect()
        };

        let mut flushed = 0;
        for page_id in resident {
            if self.flush_page(page_id)? {
                flushed += 1;
            }
        }
        debug!(flushed, "flushed all resident pages");
        Ok(flushed)
    }

    /// Deletes a page from the buffer pool and returns its frame to the free list.
    ///
    /// A page that is not resident counts as deleted. Returns `Ok(false)` if
    /// the page is pinned. A dirty page is written back first.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(true);
        };
        let frame = self.frame(frame_id);
        if frame.is_pinned() {
            return Ok(false);
        }

        if frame.is_dirty() {
            self.write_frame(page_id, frame)?;
        }

        self.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        self.disk.deallocate_page(page_id);

        debug!(%page_id, %frame_id, "page deleted");
        Ok(true)
    }

    /// Fetches a page and returns a guard that unpins it on drop.
    pub fn read_page(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageReadGuard {
            pool: self,
            page_id,
            frame,
        })
    }

    /// Fetches a page for writing. The guard unpins it on drop, marking it
    /// dirty if `data_mut` was called.
    pub fn write_page(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame = self.fetch_page(page_id)?;
        Ok(PageWriteGuard {
            pool: self,
            page_id,
            frame,
            dirty: false,
        })
    }

    /// Creates a new page and returns a write guard for it.
    pub fn new_page_guarded(&self) -> Result<PageWriteGuard<'_>> {
        let (page_id, frame) = self.new_page()?;
        Ok(PageWriteGuard {
            pool: self,
            page_id,
            frame,
            dirty: false,
        })
    }

    /// Returns the number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the history depth of the replacer.
    pub fn replacer_k(&self) -> usize {
        self.config.replacer_k
    }

    /// Returns the pool configuration.
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Returns all frames, indexed by frame id.
    pub fn frames(&self) -> &[BufferFrame] {
        &self.frames
    }

    /// Returns the backing device.
    pub fn disk(&self) -> &Arc<dyn DiskIo> {
        &self.disk
    }

    /// Returns the log manager, if one was supplied.
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Returns the number of unpinned frames eligible for eviction.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.find(&page_id).is_some()
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let state = self.latch.lock();

        let mut stats = BufferPoolStats {
            total_frames: self.config.pool_size,
            free_frames: state.free_list.len(),
            used_frames: 0,
            pinned_frames: 0,
            dirty_frames: 0,
        };
        for frame in self.frames.iter().filter(|f| !f.is_empty()) {
            stats.used_frames += 1;
            if frame.is_pinned() {
                stats.pinned_frames += 1;
            }
            if frame.is_dirty() {
                stats.dirty_frames += 1;
            }
        }
        stats
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// RAII guard for reading a page.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
}

impl<'a> PageReadGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, false);
    }
}

/// RAII guard for writing a page.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPool,
    page_id: PageId,
    frame: &'a BufferFrame,
    dirty: bool,
}

impl<'a> PageWriteGuard<'a> {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the page data.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Returns mutable access to page data and marks the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty = true;
        self.frame.write_data()
    }

    /// Marks the page dirty without touching its data.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_storage::MemoryDisk;
    use std::sync::atomic::AtomicBool;

    fn create_test_pool(pool_size: usize, replacer_k: usize) -> (BufferPool, Arc<MemoryDisk>) {
        let disk = Arc::new(MemoryDisk::new());
        let config = BufferPoolConfig {
            pool_size,
            replacer_k,
            bucket_size: 4,
        };
        let pool = BufferPool::new(config, disk.clone()).unwrap();
        (pool, disk)
    }

    /// Memory disk whose reads and writes can be made to fail.
    #[derive(Default)]
    struct FlakyDisk {
        inner: MemoryDisk,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
    }

    impl DiskIo for FlakyDisk {
        fn num_pages(&self) -> u32 {
            self.inner.num_pages()
        }

        fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
            if self.fail_reads.load(Ordering::Relaxed) {
                return Err(KestrelError::IoError("injected read failure".to_string()));
            }
            self.inner.read_page(page_id, buf)
        }

        fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
            if self.fail_writes.load(Ordering::Relaxed) {
                return Err(KestrelError::IoError("injected write failure".to_string()));
            }
            self.inner.write_page(page_id, data)
        }
    }

    #[test]
    fn test_buffer_pool_new() {
        let (pool, _disk) = create_test_pool(10, 2);

        assert_eq!(pool.pool_size(), 10);
        assert_eq!(pool.replacer_k(), 2);
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
        assert_eq!(pool.frames().len(), 10);
        assert!(pool.log_manager().is_none());
    }

    #[test]
    fn test_buffer_pool_rejects_invalid_config() {
        let disk = Arc::new(MemoryDisk::new());
        let config = BufferPoolConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            BufferPool::new(config, disk),
            Err(KestrelError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_buffer_pool_new_page() {
        let (pool, disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();

        assert_eq!(page_id, PageId::new(0));
        assert_eq!(frame.page_id(), Some(page_id));
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
        assert_eq!(pool.free_count(), 9);
        assert_eq!(pool.page_count(), 1);
        assert!(pool.contains(page_id));
        assert_eq!(pool.evictable_count(), 0);
        // New pages never touch the disk
        assert_eq!(disk.num_reads(), 0);
        assert_eq!(disk.num_writes(), 0);
    }

    #[test]
    fn test_buffer_pool_page_ids_are_sequential() {
        let (pool, _disk) = create_test_pool(10, 2);

        for expected in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            assert_eq!(page_id, PageId::new(expected));
        }
    }

    #[test]
    fn test_buffer_pool_page_ids_continue_after_device_pages() {
        let disk = Arc::new(MemoryDisk::new());
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0x11;
        disk.write_page(PageId::new(6), &data).unwrap();

        let pool = BufferPool::new(BufferPoolConfig::with_pool_size(4), disk.clone()).unwrap();
        let (page_id, _) = pool.new_page().unwrap();
        assert_eq!(page_id, PageId::new(7));

        pool.unpin_page(page_id, true);
        pool.flush_all().unwrap();
        assert_eq!(disk.page(PageId::new(6)).unwrap()[0], 0x11);
    }

    #[test]
    fn test_buffer_pool_fetch_resident_page() {
        let (pool, disk) = create_test_pool(10, 2);

        let (page_id, _) = pool.new_page().unwrap();
        let frame = pool.fetch_page(page_id).unwrap();

        assert_eq!(frame.page_id(), Some(page_id));
        assert_eq!(frame.pin_count(), 2);
        assert_eq!(disk.num_reads(), 0);
    }

    #[test]
    fn test_buffer_pool_fetch_reads_from_disk() {
        let (pool, disk) = create_test_pool(10, 2);
        let page_id = PageId::new(42);

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[100] = 0xCD;
        disk.write_page(page_id, &data).unwrap();

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.read_data()[0], 0xAB);
        assert_eq!(frame.read_data()[100], 0xCD);
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
        assert_eq!(disk.num_reads(), 1);
    }

    #[test]
    fn test_buffer_pool_fetch_invalid_page() {
        let (pool, _disk) = create_test_pool(2, 2);

        assert!(matches!(
            pool.fetch_page(PageId::INVALID),
            Err(KestrelError::PageNotFound { .. })
        ));
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_buffer_pool_unpin() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        assert!(frame.is_pinned());

        assert!(pool.unpin_page(page_id, false));
        assert!(!frame.is_pinned());
        assert_eq!(pool.evictable_count(), 1);

        // Unbalanced unpin is refused and the count stays at zero
        assert!(!pool.unpin_page(page_id, false));
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_buffer_pool_unpin_not_resident() {
        let (pool, _disk) = create_test_pool(10, 2);
        assert!(!pool.unpin_page(PageId::new(3), true));
    }

    #[test]
    fn test_buffer_pool_unpin_keeps_dirty() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        pool.fetch_page(page_id).unwrap();

        assert!(pool.unpin_page(page_id, true));
        assert!(frame.is_dirty());
        // A clean unpin never clears the flag
        assert!(pool.unpin_page(page_id, false));
        assert!(frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_evictable_only_at_zero_pins() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, _) = pool.new_page().unwrap();
        pool.fetch_page(page_id).unwrap();

        pool.unpin_page(page_id, false);
        assert_eq!(pool.evictable_count(), 0);
        pool.unpin_page(page_id, false);
        assert_eq!(pool.evictable_count(), 1);

        // Fetching again pins it and takes it off the candidate list
        pool.fetch_page(page_id).unwrap();
        assert_eq!(pool.evictable_count(), 0);
    }

    #[test]
    fn test_buffer_pool_full_all_pinned() {
        let (pool, _disk) = create_test_pool(2, 2);

        pool.new_page().unwrap();
        pool.new_page().unwrap();

        assert!(matches!(pool.new_page(), Err(KestrelError::BufferPoolFull)));
        assert!(matches!(
            pool.fetch_page(PageId::new(100)),
            Err(KestrelError::BufferPoolFull)
        ));
    }

    #[test]
    fn test_buffer_pool_reuses_unpinned_frame_after_write_back() {
        let (pool, disk) = create_test_pool(2, 2);

        let (p0, f0) = pool.new_page().unwrap();
        let (p1, f1) = pool.new_page().unwrap();
        assert_eq!(f0.pin_count(), 1);
        assert_eq!(f1.pin_count(), 1);
        assert!(matches!(pool.new_page(), Err(KestrelError::BufferPoolFull)));

        f0.write_data()[0] = 0x5A;
        assert!(pool.unpin_page(p0, true));

        let (p2, f2) = pool.new_page().unwrap();
        assert_eq!(p2, PageId::new(2));
        assert_eq!(f2.frame_id(), f0.frame_id());
        assert_eq!(f2.pin_count(), 1);
        assert_eq!(f2.read_data()[0], 0);

        // The dirty victim was written out under its old id before reuse
        assert_eq!(disk.writes(), vec![p0]);
        assert_eq!(disk.page(p0).unwrap()[0], 0x5A);
        assert!(!pool.contains(p0));
        assert!(pool.contains(p1));
        assert!(pool.contains(p2));
    }

    #[test]
    fn test_buffer_pool_clean_victim_not_written() {
        let (pool, disk) = create_test_pool(1, 2);

        let (p0, _) = pool.new_page().unwrap();
        pool.unpin_page(p0, false);
        pool.new_page().unwrap();

        assert_eq!(disk.num_writes(), 0);
        assert!(!pool.contains(p0));
    }

    #[test]
    fn test_buffer_pool_prefers_free_frames() {
        let (pool, disk) = create_test_pool(3, 2);

        let (p0, _) = pool.new_page().unwrap();
        pool.unpin_page(p0, true);

        // Two free frames remain, so nothing is evicted
        pool.new_page().unwrap();
        pool.new_page().unwrap();
        assert!(pool.contains(p0));
        assert_eq!(disk.num_writes(), 0);
    }

    #[test]
    fn test_buffer_pool_lru_k_victim_order() {
        let (pool, _disk) = create_test_pool(3, 2);

        let mut pages = Vec::new();
        for _ in 0..3 {
            let (page_id, _) = pool.new_page().unwrap();
            pool.unpin_page(page_id, false);
            pages.push(page_id);
        }

        // Second access gives page 0 a full history
        pool.fetch_page(pages[0]).unwrap();
        pool.unpin_page(pages[0], false);

        // Pages 1 and 2 have one access; page 1 was seen first
        pool.new_page().unwrap();
        assert!(pool.contains(pages[0]));
        assert!(!pool.contains(pages[1]));
        assert!(pool.contains(pages[2]));
    }

    #[test]
    fn test_buffer_pool_eviction_round_trip() {
        let (pool, _disk) = create_test_pool(1, 2);

        let (p0, frame) = pool.new_page().unwrap();
        frame.copy_from(b"hello kestrel");
        pool.unpin_page(p0, true);

        // Evict p0 by creating another page in the single frame
        let (p1, _) = pool.new_page().unwrap();
        pool.unpin_page(p1, false);
        assert!(!pool.contains(p0));

        let frame = pool.fetch_page(p0).unwrap();
        let mut buf = [0u8; 13];
        frame.copy_to(&mut buf);
        assert_eq!(&buf, b"hello kestrel");
    }

    #[test]
    fn test_buffer_pool_refetch_sees_last_flushed_bytes() {
        let (pool, _disk) = create_test_pool(1, 2);

        let (p0, frame) = pool.new_page().unwrap();
        frame.write_data()[0] = 1;
        assert!(pool.flush_page(p0).unwrap());

        // Modified in memory but unpinned clean: the change is dropped on eviction
        frame.write_data()[0] = 2;
        pool.unpin_page(p0, false);

        let (p1, _) = pool.new_page().unwrap();
        pool.unpin_page(p1, false);

        let frame = pool.fetch_page(p0).unwrap();
        assert_eq!(frame.read_data()[0], 1);
    }

    #[test]
    fn test_buffer_pool_flush_page() {
        let (pool, disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        pool.unpin_page(page_id, true);

        assert!(pool.flush_page(page_id).unwrap());
        assert_eq!(disk.writes(), vec![page_id]);
        assert!(!frame.is_dirty());

        // Flushing is unconditional, even for a clean page
        assert!(pool.flush_page(page_id).unwrap());
        assert_eq!(disk.writes_for(page_id), 2);
    }

    #[test]
    fn test_buffer_pool_flush_restores_pin_state() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (pinned, pinned_frame) = pool.new_page().unwrap();
        let (unpinned, unpinned_frame) = pool.new_page().unwrap();
        pool.unpin_page(unpinned, true);
        assert_eq!(pool.evictable_count(), 1);

        assert!(pool.flush_page(pinned).unwrap());
        assert!(pool.flush_page(unpinned).unwrap());

        assert_eq!(pinned_frame.pin_count(), 1);
        assert_eq!(unpinned_frame.pin_count(), 0);
        assert!(!unpinned_frame.is_dirty());
        assert_eq!(pool.evictable_count(), 1);
        assert!(pool.unpin_page(pinned, false));
        assert_eq!(pool.evictable_count(), 2);
    }

    #[test]
    fn test_buffer_pool_flush_failure_keeps_dirty() {
        let disk = Arc::new(FlakyDisk::default());
        let pool = BufferPool::new(BufferPoolConfig::with_pool_size(2), disk.clone()).unwrap();

        let (page_id, frame) = pool.new_page().unwrap();
        pool.unpin_page(page_id, true);

        disk.fail_writes.store(true, Ordering::Relaxed);
        assert!(pool.flush_page(page_id).is_err());
        assert!(frame.is_dirty());
        assert_eq!(frame.pin_count(), 0);
        assert_eq!(pool.evictable_count(), 1);
    }

    #[test]
    fn test_buffer_pool_flush_not_resident() {
        let (pool, disk) = create_test_pool(10, 2);
        assert!(!pool.flush_page(PageId::new(9)).unwrap());
        assert_eq!(disk.num_writes(), 0);
    }

    #[test]
    fn test_buffer_pool_flush_all() {
        let (pool, disk) = create_test_pool(10, 2);

        let mut pages = Vec::new();
        for i in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            pool.unpin_page(page_id, i % 2 == 0);
            pages.push(page_id);
        }

        assert_eq!(pool.flush_all().unwrap(), 5);
        assert_eq!(disk.num_writes(), 5);
        for page_id in pages {
            assert_eq!(disk.writes_for(page_id), 1);
        }
        assert_eq!(pool.stats().dirty_frames, 0);
    }

    #[test]
    fn test_buffer_pool_delete_page() {
        let (pool, disk) = create_test_pool(10, 2);

        let (page_id, _) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        assert!(pool.delete_page(page_id).unwrap());
        assert!(!pool.contains(page_id));
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.evictable_count(), 0);
        assert_eq!(disk.num_writes(), 0);
    }

    #[test]
    fn test_buffer_pool_delete_dirty_page_writes_back() {
        let (pool, disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data()[0] = 0x77;
        pool.unpin_page(page_id, true);

        assert!(pool.delete_page(page_id).unwrap());
        assert_eq!(disk.writes(), vec![page_id]);
        assert_eq!(disk.page(page_id).unwrap()[0], 0x77);
    }

    #[test]
    fn test_buffer_pool_delete_pinned_page() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();

        assert!(!pool.delete_page(page_id).unwrap());
        assert!(pool.contains(page_id));
        assert_eq!(frame.pin_count(), 1);
        assert_eq!(pool.free_count(), 9);
    }

    #[test]
    fn test_buffer_pool_delete_not_resident() {
        let (pool, disk) = create_test_pool(10, 2);

        assert!(pool.delete_page(PageId::new(1234)).unwrap());
        assert_eq!(pool.free_count(), 10);
        assert_eq!(pool.page_count(), 0);
        assert_eq!(disk.num_writes(), 0);
    }

    #[test]
    fn test_buffer_pool_deleted_frame_is_reused_first() {
        let (pool, _disk) = create_test_pool(2, 2);

        let (p0, f0) = pool.new_page().unwrap();
        let (p1, _) = pool.new_page().unwrap();
        pool.unpin_page(p0, false);
        pool.unpin_page(p1, false);
        let frame_id = f0.frame_id();

        pool.delete_page(p0).unwrap();
        let (_, frame) = pool.new_page().unwrap();
        assert_eq!(frame.frame_id(), frame_id);
        // p1 was evictable but the free frame won
        assert!(pool.contains(p1));
    }

    #[test]
    fn test_buffer_pool_write_back_failure_keeps_victim() {
        let disk = Arc::new(FlakyDisk::default());
        let pool = BufferPool::new(BufferPoolConfig::with_pool_size(1), disk.clone()).unwrap();

        let (p0, _) = pool.new_page().unwrap();
        pool.unpin_page(p0, true);

        disk.fail_writes.store(true, Ordering::Relaxed);
        assert!(matches!(pool.new_page(), Err(KestrelError::IoError(_))));
        assert!(pool.contains(p0));
        assert_eq!(pool.evictable_count(), 1);

        disk.fail_writes.store(false, Ordering::Relaxed);
        let (p1, _) = pool.new_page().unwrap();
        assert!(pool.contains(p1));
        assert!(disk.inner.contains(p0));
    }

    #[test]
    fn test_buffer_pool_load_failure_frees_frame() {
        let disk = Arc::new(FlakyDisk::default());
        let pool = BufferPool::new(BufferPoolConfig::with_pool_size(2), disk.clone()).unwrap();

        disk.fail_reads.store(true, Ordering::Relaxed);
        assert!(pool.fetch_page(PageId::new(7)).is_err());
        assert!(!pool.contains(PageId::new(7)));
        assert_eq!(pool.free_count(), 2);

        disk.fail_reads.store(false, Ordering::Relaxed);
        let frame = pool.fetch_page(PageId::new(7)).unwrap();
        assert_eq!(frame.pin_count(), 1);
    }

    #[test]
    fn test_buffer_pool_read_guard() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        frame.write_data()[0] = 9;
        pool.unpin_page(page_id, false);

        {
            let guard = pool.read_page(page_id).unwrap();
            assert_eq!(guard.page_id(), page_id);
            assert_eq!(guard.data()[0], 9);
            assert_eq!(frame.pin_count(), 1);
        }

        assert_eq!(frame.pin_count(), 0);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_write_guard() {
        let (pool, _disk) = create_test_pool(10, 2);

        let (page_id, frame) = pool.new_page().unwrap();
        pool.unpin_page(page_id, false);

        {
            let mut guard = pool.write_page(page_id).unwrap();
            guard.data_mut()[0] = 0xFF;
        }

        assert_eq!(frame.pin_count(), 0);
        assert!(frame.is_dirty());
        assert_eq!(frame.read_data()[0], 0xFF);
    }

    #[test]
    fn test_buffer_pool_write_guard_untouched_stays_clean() {
        let (pool, _disk) = create_test_pool(10, 2);

        let page_id = {
            let guard = pool.new_page_guarded().unwrap();
            assert_eq!(guard.data()[0], 0);
            guard.page_id()
        };

        let frame = pool.fetch_page(page_id).unwrap();
        assert_eq!(frame.pin_count(), 1);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_buffer_pool_stats() {
        let (pool, _disk) = create_test_pool(10, 2);

        for i in 0..5 {
            let (page_id, _) = pool.new_page().unwrap();
            if i % 2 == 0 {
                pool.unpin_page(page_id, true); // Dirty
            }
            // Odd pages remain pinned
        }

        let stats = pool.stats();
        assert_eq!(
            stats,
            BufferPoolStats {
                total_frames: 10,
                free_frames: 5,
                used_frames: 5,
                pinned_frames: 2,
                dirty_frames: 3,
            }
        );
    }

    #[test]
    fn test_buffer_pool_log_manager_hook() {
        let disk = Arc::new(MemoryDisk::new());
        let log = Arc::new(LogManager::new());
        let pool = BufferPool::with_log_manager(
            BufferPoolConfig::with_pool_size(4),
            disk,
            Some(log.clone()),
        )
        .unwrap();

        assert!(Arc::ptr_eq(pool.log_manager().unwrap(), &log));
    }
}
