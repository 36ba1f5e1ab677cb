//! Extendible hash index over the buffer pool.
//!
//! The index consists of one directory page (an array of bucket page ids
//! with per-slot local depths and a global depth) and a set of bucket
//! pages (bit-packed slotted pages holding fixed-size key/value pairs).
//! Buckets split on overflow and merge on empty; the directory doubles
//! and halves by powers of two without rehashing the whole table.

mod bucket;
mod directory;
mod error;
mod extendible;
mod types;

pub use bucket::{BucketPage, bucket_capacity};
pub use directory::{DIRECTORY_ARRAY_SIZE, DirectoryPage, MAX_GLOBAL_DEPTH};
pub use error::IndexError;
pub use extendible::ExtendibleHashIndex;
pub use types::{
    DefaultKeyHasher, KeyComparator, KeyHasher, OrdComparator, Packable, Transaction,
};
