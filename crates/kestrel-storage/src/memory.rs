//! In-memory page device.

use crate::disk::DiskIo;
use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::{KestrelError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory implementation of `DiskIo`.
///
/// Pages are kept in a `HashMap` and lost on drop. Every write is appended
/// to an ordered log so callers can observe exactly which pages were written
/// back and in what order.
#[derive(Default)]
pub struct MemoryDisk {
    /// Raw page data.
    pages: Mutex<HashMap<PageId, Box<[u8; PAGE_SIZE]>>>,
    /// Page ids in the order they were written.
    write_log: Mutex<Vec<PageId>>,
    num_reads: AtomicU64,
}

impl MemoryDisk {
    /// Creates an empty memory disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the page has been written at least once.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.lock().contains_key(&page_id)
    }

    /// Returns a copy of the stored page, if it was ever written.
    pub fn page(&self, page_id: PageId) -> Option<Box<[u8; PAGE_SIZE]>> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Returns the page ids written so far, oldest first.
    pub fn writes(&self) -> Vec<PageId> {
        self.write_log.lock().clone()
    }

    /// Number of writes issued for a single page.
    pub fn writes_for(&self, page_id: PageId) -> usize {
        self.write_log.lock().iter().filter(|&&p| p == page_id).count()
    }

    /// Number of page writes issued so far.
    pub fn num_writes(&self) -> u64 {
        self.write_log.lock().len() as u64
    }

    /// Number of page reads served so far.
    pub fn num_reads(&self) -> u64 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Forgets the write log, keeping the page contents.
    pub fn clear_write_log(&self) {
        self.write_log.lock().clear();
    }
}

impl DiskIo for MemoryDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(KestrelError::PageNotFound { page_id: page_id.get() });
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        match self.pages.lock().get(&page_id) {
            Some(page) => buf.copy_from_slice(&page[..]),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(KestrelError::PageNotFound { page_id: page_id.get() });
        }

        self.pages.lock().insert(page_id, Box::new(*data));
        self.write_log.lock().push(page_id);
        Ok(())
    }

    fn num_pages(&self) -> u32 {
        self.pages
            .lock()
            .keys()
            .map(|page_id| page_id.get() + 1)
            .max()
            .unwrap_or(0)
    }
}
