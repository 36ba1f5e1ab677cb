//! Hash directory page: the indirection table of extendible hashing.
//!
//! # Page Layout
//!
//! ```text
//! +---------------------+ offset 0
//! | page_id (u32)       |
//! +---------------------+ offset 4
//! | global_depth (u32)  |
//! +---------------------+ offset 8
//! | local_depths (u8)   |  512 entries
//! +---------------------+ offset 520
//! | bucket_page_ids     |  512 * u32, little-endian
//! +---------------------+ offset 2568
//! ```
//!
//! Only the first `2^global_depth` slots are live; the rest are unused
//! until the directory grows.

use std::collections::HashMap;

use super::types::Packable;
use crate::storage::{PAGE_SIZE, PageId};

/// Maximum global depth. A bucket that must split while every slot is at
/// this depth cannot, and the triggering insert is reported as an error.
pub const MAX_GLOBAL_DEPTH: u32 = 9;

/// Number of directory slots backed by the page.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_GLOBAL_DEPTH;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 4;
const LOCAL_DEPTHS_OFFSET: usize = 8;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;
const DIRECTORY_PAGE_SIZE: usize = BUCKET_PAGE_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * 4;

const _: () = assert!(DIRECTORY_PAGE_SIZE <= PAGE_SIZE);

/// Typed view of the directory page over raw page bytes.
///
/// Wraps `&[u8]` for reads or `&mut [u8]` for writes; decoding happens
/// per field access, so the view is free to construct and nothing is
/// copied.
pub struct DirectoryPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> DirectoryPage<T> {
    /// Wraps page bytes in a directory view.
    pub fn attach(data: T) -> Self {
        debug_assert!(data.as_ref().len() >= PAGE_SIZE);
        Self { data }
    }

    /// The directory page's own id.
    pub fn page_id(&self) -> PageId {
        PageId::new(u32::unpack_from(&self.data.as_ref()[PAGE_ID_OFFSET..]))
    }

    /// Number of low-order hash bits used to index the directory.
    pub fn global_depth(&self) -> u32 {
        u32::unpack_from(&self.data.as_ref()[GLOBAL_DEPTH_OFFSET..])
    }

    /// Number of live directory slots.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    /// Mask selecting the low `global_depth` bits of a hash.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth()) - 1
    }

    /// Resolves a hash to a live directory slot.
    pub fn hash_to_index(&self, hash: u32) -> usize {
        (hash & self.global_depth_mask()) as usize
    }

    /// Number of low-order hash bits the bucket at `slot` distinguishes.
    pub fn local_depth(&self, slot: usize) -> u32 {
        self.data.as_ref()[LOCAL_DEPTHS_OFFSET + slot] as u32
    }

    /// Mask selecting the low `local_depth` bits for `slot`.
    pub fn local_depth_mask(&self, slot: usize) -> u32 {
        (1u32 << self.local_depth(slot)) - 1
    }

    /// The bit that distinguishes `slot`'s bucket from its split image.
    pub fn local_high_bit(&self, slot: usize) -> u32 {
        1u32 << self.local_depth(slot)
    }

    /// The bucket page a directory slot points at.
    pub fn bucket_page_id(&self, slot: usize) -> PageId {
        let offset = BUCKET_PAGE_IDS_OFFSET + slot * 4;
        PageId::new(u32::unpack_from(&self.data.as_ref()[offset..]))
    }

    /// True iff every live slot has `local_depth < global_depth`, i.e.
    /// the upper and lower halves of the directory mirror each other.
    pub fn can_shrink(&self) -> bool {
        (0..self.size()).all(|slot| self.local_depth(slot) < self.global_depth())
    }

    /// Checks the directory invariants.
    ///
    /// - every live slot has `local_depth <= global_depth`
    /// - every live slot points at a valid bucket page
    /// - a bucket pointed at by a slot of local depth `d` has exactly
    ///   `2^(global_depth - d)` slots pointing at it
    /// - all slots sharing a bucket agree on its local depth
    ///
    /// # Panics
    ///
    /// Panics on any violation; an inconsistent directory is a bug, not a
    /// recoverable state.
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        assert!(
            global_depth <= MAX_GLOBAL_DEPTH,
            "global depth {} exceeds maximum {}",
            global_depth,
            MAX_GLOBAL_DEPTH
        );

        let mut pointer_counts: HashMap<PageId, usize> = HashMap::new();
        let mut local_depths: HashMap<PageId, u32> = HashMap::new();

        for slot in 0..self.size() {
            let local_depth = self.local_depth(slot);
            assert!(
                local_depth <= global_depth,
                "local depth {} exceeds global depth {} at slot {}",
                local_depth,
                global_depth,
                slot
            );

            let page_id = self.bucket_page_id(slot);
            assert!(page_id.is_valid(), "slot {} points at no bucket", slot);

            *pointer_counts.entry(page_id).or_insert(0) += 1;
            match local_depths.get(&page_id) {
                Some(&known) => assert_eq!(
                    known, local_depth,
                    "slots sharing bucket {:?} disagree on local depth",
                    page_id
                ),
                None => {
                    local_depths.insert(page_id, local_depth);
                }
            }
        }

        for (page_id, count) in &pointer_counts {
            let local_depth = local_depths[page_id];
            let expected = 1usize << (global_depth - local_depth);
            assert_eq!(
                *count, expected,
                "bucket {:?} at local depth {} has {} pointers, expected {}",
                page_id, local_depth, count, expected
            );
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> DirectoryPage<T> {
    /// Initializes an empty directory of global depth 0.
    ///
    /// Every slot starts at local depth 0 pointing at no bucket; the
    /// caller wires slot 0 to the first bucket page.
    pub fn init(&mut self, page_id: PageId) {
        self.set_page_id(page_id);
        self.set_global_depth(0);
        for slot in 0..DIRECTORY_ARRAY_SIZE {
            self.set_local_depth(slot, 0);
            self.set_bucket_page_id(slot, PageId::INVALID);
        }
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        page_id
            .page_num()
            .pack_into(&mut self.data.as_mut()[PAGE_ID_OFFSET..]);
    }

    fn set_global_depth(&mut self, depth: u32) {
        depth.pack_into(&mut self.data.as_mut()[GLOBAL_DEPTH_OFFSET..]);
    }

    pub fn set_local_depth(&mut self, slot: usize, depth: u32) {
        debug_assert!(depth <= MAX_GLOBAL_DEPTH);
        self.data.as_mut()[LOCAL_DEPTHS_OFFSET + slot] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, slot: usize) {
        let depth = self.local_depth(slot);
        self.set_local_depth(slot, depth + 1);
    }

    pub fn decr_local_depth(&mut self, slot: usize) {
        let depth = self.local_depth(slot);
        debug_assert!(depth > 0);
        self.set_local_depth(slot, depth - 1);
    }

    pub fn set_bucket_page_id(&mut self, slot: usize, page_id: PageId) {
        let offset = BUCKET_PAGE_IDS_OFFSET + slot * 4;
        page_id
            .page_num()
            .pack_into(&mut self.data.as_mut()[offset..]);
    }

    /// Doubles the directory: every new slot `i + 2^old_depth` copies the
    /// state of slot `i`. Returns false if the directory is already at
    /// `MAX_GLOBAL_DEPTH`.
    pub fn incr_global_depth(&mut self) -> bool {
        let old_depth = self.global_depth();
        if old_depth >= MAX_GLOBAL_DEPTH {
            return false;
        }

        let old_size = 1usize << old_depth;
        for slot in 0..old_size {
            let mirror = slot + old_size;
            let page_id = self.bucket_page_id(slot);
            let local_depth = self.local_depth(slot);
            self.set_bucket_page_id(mirror, page_id);
            self.set_local_depth(mirror, local_depth);
        }
        self.set_global_depth(old_depth + 1);
        true
    }

    /// Halves the directory. The caller must have checked
    /// [`can_shrink`](Self::can_shrink).
    pub fn decr_global_depth(&mut self) {
        let depth = self.global_depth();
        debug_assert!(depth > 0);
        debug_assert!(self.can_shrink());
        self.set_global_depth(depth - 1);
    }
}
