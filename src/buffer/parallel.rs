//! Sharded buffer pool.

use std::sync::Arc;

use parking_lot::Mutex;

use super::error::BufferError;
use super::guard::{PageReadGuard, PageWriteGuard};
use super::pool::{BufferPool, BufferPoolInstance};
use crate::storage::{DiskManager, LogManager, PageId};

/// A facade over `num_instances` independent [`BufferPoolInstance`]s
/// sharing one disk manager.
///
/// Page id `p` is served by shard `p mod num_instances`. Because each
/// shard only allocates ids striped to itself, routing and allocation
/// agree, and distinct shards never contend on a latch.
pub struct ParallelBufferPool {
    shards: Vec<BufferPoolInstance>,
    /// Shard to try first on the next `new_page`.
    next_shard: Mutex<usize>,
}

impl ParallelBufferPool {
    /// Creates a pool of `num_instances` shards of `pool_size` frames
    /// each.
    ///
    /// # Panics
    ///
    /// Panics if `num_instances` or `pool_size` is 0.
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk: Arc<dyn DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "num_instances must be > 0");

        let shards = (0..num_instances)
            .map(|i| {
                BufferPoolInstance::new_striped(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    disk.clone(),
                    log_manager.clone(),
                )
            })
            .collect();

        Self {
            shards,
            next_shard: Mutex::new(0),
        }
    }

    /// Returns the number of shards.
    pub fn num_instances(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, page_id: PageId) -> &BufferPoolInstance {
        &self.shards[page_id.page_num() as usize % self.shards.len()]
    }
}

impl BufferPool for ParallelBufferPool {
    fn fetch_page(&self, page_id: PageId) -> Result<PageReadGuard<'_>, BufferError> {
        self.shard_for(page_id).fetch_page(page_id)
    }

    fn fetch_page_mut(&self, page_id: PageId) -> Result<PageWriteGuard<'_>, BufferError> {
        self.shard_for(page_id).fetch_page_mut(page_id)
    }

    /// Tries each shard once, starting from a round-robin cursor, and
    /// returns the first successful allocation. The cursor advances by one
    /// per call so consecutive allocations spread across shards.
    fn new_page(&self) -> Result<PageWriteGuard<'_>, BufferError> {
        let num = self.shards.len();
        let start = {
            let mut cursor = self.next_shard.lock();
            let start = *cursor;
            *cursor = (start + 1) % num;
            start
        };

        let mut last_err = BufferError::NoFreeFrames;
        for i in 0..num {
            match self.shards[(start + i) % num].new_page() {
                Ok(guard) => return Ok(guard),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.shard_for(page_id).unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> Result<bool, BufferError> {
        self.shard_for(page_id).flush_page(page_id)
    }

    fn flush_all(&self) -> Result<(), BufferError> {
        for shard in &self.shards {
            shard.flush_all()?;
        }
        Ok(())
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        self.shard_for(page_id).delete_page(page_id)
    }

    /// Frames per shard, not the total across shards.
    fn pool_size(&self) -> usize {
        self.shards[0].pool_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryDiskManager;

    fn pool(num_instances: usize, pool_size: usize) -> ParallelBufferPool {
        ParallelBufferPool::new(
            num_instances,
            pool_size,
            Arc::new(MemoryDiskManager::new()),
            None,
        )
    }

    #[test]
    fn test_round_robin_allocation() {
        let pool = pool(4, 5);

        let mut residues: Vec<u32> = (0..4)
            .map(|_| {
                let guard = pool.new_page().unwrap();
                guard.page_id().page_num() % 4
            })
            .collect();
        residues.sort_unstable();
        assert_eq!(residues, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_routing_matches_allocation() {
        let pool = pool(4, 5);

        for _ in 0..8 {
            let page_id = {
                let mut guard = pool.new_page().unwrap();
                guard[0] = 0xEE;
                guard.mark_dirty();
                guard.page_id()
            };

            let guard = pool.fetch_page(page_id).unwrap();
            assert_eq!(guard[0], 0xEE);
        }
    }

    #[test]
    fn test_new_page_skips_full_shard() {
        let pool = pool(2, 1);

        // Pin the single frame of the shard the cursor points at.
        let _held = pool.new_page().unwrap();

        // Next call starts at the other shard or falls through to it.
        let guard = pool.new_page().unwrap();
        assert_ne!(
            guard.page_id().page_num() % 2,
            _held.page_id().page_num() % 2
        );
    }

    #[test]
    fn test_new_page_all_shards_full() {
        let pool = pool(2, 1);
        let _g0 = pool.new_page().unwrap();
        let _g1 = pool.new_page().unwrap();
        assert!(matches!(pool.new_page(), Err(BufferError::NoFreeFrames)));
    }

    #[test]
    fn test_pool_size_is_per_shard() {
        let pool = pool(4, 5);
        assert_eq!(pool.pool_size(), 5);
        assert_eq!(pool.num_instances(), 4);
    }

    #[test]
    fn test_flush_all_sweeps_shards() {
        let disk = Arc::new(MemoryDiskManager::new());
        let pool = ParallelBufferPool::new(4, 5, disk.clone(), None);

        for _ in 0..4 {
            let mut guard = pool.new_page().unwrap();
            guard[0] = 1;
            guard.mark_dirty();
        }

        pool.flush_all().unwrap();
        assert_eq!(disk.page_count(), 4);
    }
}
