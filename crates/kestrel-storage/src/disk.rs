//! Disk manager for page-level file I/O.

use kestrel_common::page::{PageId, PAGE_SIZE};
use kestrel_common::{KestrelError, Result, StorageConfig};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Name of the data file inside the data directory.
pub const DATA_FILE_NAME: &str = "kestrel.db";

/// Synchronous page I/O consumed by the buffer pool.
///
/// Reads and writes are always exactly one page. Implementations must be
/// safe to share across threads; the buffer pool serializes its own calls.
pub trait DiskIo: Send + Sync {
    /// Reads a page into `buf`. Pages that were never written read as zeroes.
    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()>;

    /// Writes a full page.
    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()>;

    /// One past the highest page id the device holds. New page ids start here.
    fn num_pages(&self) -> u32;

    /// Releases the on-disk space of a page. Nothing is reclaimed by default.
    fn deallocate_page(&self, _page_id: PageId) {}
}

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Directory holding the data file.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
        }
    }
}

impl From<&StorageConfig> for DiskManagerConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
        }
    }
}

/// Reads and writes pages of a single data file.
///
/// Page `n` lives at byte offset `n * PAGE_SIZE`. The file grows as pages
/// past its end are written.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// The open data file.
    file: Mutex<FileHandle>,
    num_reads: AtomicU64,
    num_writes: AtomicU64,
}

/// Handle for the open data file.
struct FileHandle {
    file: File,
    /// Number of pages in the file.
    num_pages: u32,
}

impl DiskManager {
    /// Opens (or creates) the data file under `config.data_dir`.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let path = config.data_dir.join(DATA_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(KestrelError::IoError(format!(
                "data file {} has size {} which is not a multiple of the page size",
                path.display(),
                file_size
            )));
        }
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;
        debug!(path = %path.display(), num_pages, "opened data file");

        Ok(Self {
            config,
            file: Mutex::new(FileHandle { file, num_pages }),
            num_reads: AtomicU64::new(0),
            num_writes: AtomicU64::new(0),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Number of page reads served so far.
    pub fn num_reads(&self) -> u64 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Number of page writes issued so far.
    pub fn num_writes(&self) -> u64 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.lock().file.sync_all()?;
        Ok(())
    }
}

impl DiskIo for DiskManager {
    fn num_pages(&self) -> u32 {
        self.file.lock().num_pages
    }

    fn read_page(&self, page_id: PageId, buf: &mut [u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(KestrelError::PageNotFound { page_id: page_id.get() });
        }

        let mut handle = self.file.lock();
        self.num_reads.fetch_add(1, Ordering::Relaxed);

        // Pages created in memory and evicted clean were never written.
        if page_id.get() >= handle.num_pages {
            buf.fill(0);
            return Ok(());
        }

        handle.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        handle.file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() {
            return Err(KestrelError::PageNotFound { page_id: page_id.get() });
        }

        let mut handle = self.file.lock();
        handle.file.seek(SeekFrom::Start(page_id.file_offset()))?;
        handle.file.write_all(data)?;

        if self.config.fsync_enabled {
            handle.file.sync_all()?;
        }

        // Update page count if we extended the file
        if page_id.get() >= handle.num_pages {
            handle.num_pages = page_id.get() + 1;
        }
        self.num_writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().file.sync_all();
    }
}
