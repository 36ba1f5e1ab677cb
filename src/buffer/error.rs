//! Buffer pool errors.

use crate::storage::StorageError;

/// Errors that can occur during buffer pool operations.
#[derive(Debug)]
pub enum BufferError {
    /// No free frames available and all pages are pinned.
    ///
    /// This occurs when the buffer pool is full and no pages can be evicted
    /// because they are all currently in use (pin_count > 0).
    NoFreeFrames,

    /// Underlying disk I/O error.
    Disk(StorageError),
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::NoFreeFrames => {
                write!(f, "no free frames available and all pages are pinned")
            }
            BufferError::Disk(e) => write!(f, "disk error: {}", e),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Disk(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BufferError {
    fn from(e: StorageError) -> Self {
        BufferError::Disk(e)
    }
}
