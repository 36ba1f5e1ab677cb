//! Buffer pool for page caching.
//!
//! The buffer pool caches pages in a fixed set of frames with LRU
//! replacement and RAII-based access guards.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolInstance;
//! use strata::storage::MemoryDiskManager;
//!
//! let disk = Arc::new(MemoryDiskManager::new());
//! let pool = BufferPoolInstance::new(64, disk, None);
//!
//! // Allocate and write a new page
//! let page_id = {
//!     let mut guard = pool.new_page().unwrap();
//!     guard[0..5].copy_from_slice(b"hello");
//!     guard.mark_dirty();
//!     guard.page_id()
//! }; // unpins on drop
//!
//! // Read the page back
//! let guard = pool.fetch_page(page_id).unwrap();
//! assert_eq!(&guard[0..5], b"hello");
//! ```

mod error;
mod frame;
mod guard;
mod parallel;
mod pool;
mod replacer;

pub use error::BufferError;
pub use frame::FrameId;
pub use guard::{PageReadGuard, PageWriteGuard};
pub use parallel::ParallelBufferPool;
pub use pool::{BufferPool, BufferPoolInstance};
pub use replacer::{LruReplacer, Replacer};
