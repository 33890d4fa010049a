//! Error types for Kestrel.

use thiserror::Error;

/// Result type alias using KestrelError.
pub type Result<T> = std::result::Result<T, KestrelError>;

/// Errors that can occur in Kestrel operations.
///
/// Conditions the caller is expected to handle inline (page not resident,
/// pin violations) are reported as `false` by the buffer pool rather than
/// through this type.
#[derive(Debug, Error)]
pub enum KestrelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u32 },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
