//! RAII guards for buffer pool page access.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::pool::BufferPoolInstance;
use crate::storage::{PageData, PageId};

/// RAII guard for read-only page access.
///
/// When dropped, automatically unpins the page in the buffer pool.
/// Dereferences to the page bytes.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPoolInstance,
    frame_id: FrameId,
    page_id: PageId,
    data: RwLockReadGuard<'a, PageData>,
}

impl<'a> PageReadGuard<'a> {
    pub(super) fn new(
        pool: &'a BufferPoolInstance,
        frame_id: FrameId,
        page_id: PageId,
        data: RwLockReadGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            data,
        }
    }

    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_frame(self.frame_id, false);
    }
}

/// RAII guard for mutable page access.
///
/// When dropped, automatically unpins the page, carrying the dirty flag
/// set via [`PageWriteGuard::mark_dirty`]. A guard that never marked the
/// page dirty unpins clean, so a failed mutation attempt costs nothing.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPoolInstance,
    frame_id: FrameId,
    page_id: PageId,
    data: RwLockWriteGuard<'a, PageData>,
    is_dirty: bool,
}

impl<'a> PageWriteGuard<'a> {
    pub(super) fn new(
        pool: &'a BufferPoolInstance,
        frame_id: FrameId,
        page_id: PageId,
        data: RwLockWriteGuard<'a, PageData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            data,
            is_dirty: false,
        }
    }

    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Declares that the page bytes have been modified.
    ///
    /// The dirty flag sticks: it is OR-ed into the frame's flag on unpin.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data.as_slice()
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data.as_mut_slice()
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_frame(self.frame_id, self.is_dirty);
    }
}
