//! Storage layer for Kestrel.
//!
//! This crate provides:
//! - The `DiskIo` trait consumed by the buffer pool for page reads and writes
//! - `DiskManager`, a file-backed implementation over a single data file
//! - `MemoryDisk`, an in-memory implementation that records its I/O
//! - The write-ahead log hook (`LogManager`, `Lsn`)

mod disk;
mod log;
mod memory;

pub use disk::{DiskIo, DiskManager, DiskManagerConfig, DATA_FILE_NAME};
pub use log::{LogManager, Lsn};
pub use memory::MemoryDisk;
