//! Hash index errors.

use crate::buffer::BufferError;

/// Errors that can occur during hash index operations.
#[derive(Debug)]
pub enum IndexError {
    /// The directory is at its maximum depth and a bucket that must split
    /// cannot. The insert that triggered this has not taken effect.
    DirectoryDepthLimit,

    /// Underlying buffer pool error.
    Buffer(BufferError),
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexError::DirectoryDepthLimit => {
                write!(f, "directory cannot grow past its maximum global depth")
            }
            IndexError::Buffer(e) => write!(f, "buffer pool error: {}", e),
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::Buffer(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for IndexError {
    fn from(e: BufferError) -> Self {
        IndexError::Buffer(e)
    }
}
