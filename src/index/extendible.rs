//! Extendible hash index.
//!
//! The index owns a directory page id and goes through the buffer pool
//! for every page access. Directory and bucket pages are decoded views
//! over pinned page bytes, never long-lived objects; a pin is held only
//! for the duration of one operation.

use std::marker::PhantomData;
use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;

use super::bucket::BucketPage;
use super::directory::DirectoryPage;
use super::error::IndexError;
use super::types::{KeyComparator, KeyHasher, Packable, Transaction};
use crate::buffer::BufferPool;
use crate::storage::PageId;

/// A hash table whose directory grows by powers of two and whose buckets
/// split and merge locally.
///
/// Keys and values are fixed-width [`Packable`] types; the comparator and
/// the 32-bit hash function are supplied by the caller.
///
/// # Latching
///
/// A table-level reader/writer latch serializes structural changes:
/// lookups take it shared, inserts and removes take it exclusive. Page
/// pins are acquired under the latch and released before an operation
/// returns. The pool must have at least three frames (directory, bucket
/// and split image are pinned together during a split).
pub struct ExtendibleHashIndex<K, V, C, H> {
    pool: Arc<dyn BufferPool>,
    directory_page_id: PageId,
    comparator: C,
    hasher: H,
    table_latch: RwLock<()>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C, H> ExtendibleHashIndex<K, V, C, H>
where
    K: Packable,
    V: Packable + PartialEq,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
{
    /// Creates a new index: a directory of global depth 0 pointing at one
    /// empty bucket.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot supply the two initial pages.
    pub fn new(pool: Arc<dyn BufferPool>, comparator: C, hasher: H) -> Result<Self, IndexError> {
        let directory_page_id;
        {
            let mut dir_guard = pool.new_page()?;
            directory_page_id = dir_guard.page_id();

            let mut bucket_guard = pool.new_page()?;
            let bucket_page_id = bucket_guard.page_id();
            // A zeroed page already is a valid empty bucket.
            bucket_guard.mark_dirty();
            drop(bucket_guard);

            let mut dir = DirectoryPage::attach(&mut dir_guard[..]);
            dir.init(directory_page_id);
            dir.set_bucket_page_id(0, bucket_page_id);
            dir_guard.mark_dirty();
        }

        Ok(Self {
            pool,
            directory_page_id,
            comparator,
            hasher,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// The directory page id, stable for the lifetime of the index.
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    fn hash(&self, key: &K) -> u32 {
        self.hasher.hash(key)
    }

    /// Returns every value stored under `key`.
    pub fn get(&self, _tx: Option<&Transaction>, key: &K) -> Result<Vec<V>, IndexError> {
        let _latch = self.table_latch.read();

        let dir_guard = self.pool.fetch_page(self.directory_page_id)?;
        let dir = DirectoryPage::attach(&dir_guard[..]);
        let bucket_page_id = dir.bucket_page_id(dir.hash_to_index(self.hash(key)));

        let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
        let bucket = BucketPage::<_, K, V>::attach(&bucket_guard[..]);

        let mut result = Vec::new();
        bucket.lookup(key, &self.comparator, &mut result);
        Ok(result)
    }

    /// Inserts a `(key, value)` pair.
    ///
    /// Returns `Ok(false)` if the exact pair is already present. A full
    /// bucket is split, growing the directory as needed; splitting may
    /// change the directory even when the insert ultimately reports a
    /// duplicate.
    ///
    /// # Errors
    ///
    /// `IndexError::DirectoryDepthLimit` if room can only be made by
    /// growing past `MAX_GLOBAL_DEPTH`. The set of stored pairs is
    /// unchanged in that case.
    pub fn insert(&self, tx: Option<&Transaction>, key: &K, value: &V) -> Result<bool, IndexError> {
        let _latch = self.table_latch.write();

        {
            let dir_guard = self.pool.fetch_page(self.directory_page_id)?;
            let dir = DirectoryPage::attach(&dir_guard[..]);
            let bucket_page_id = dir.bucket_page_id(dir.hash_to_index(self.hash(key)));
            drop(dir);

            let mut bucket_guard = self.pool.fetch_page_mut(bucket_page_id)?;
            let mut bucket = BucketPage::<_, K, V>::attach(&mut bucket_guard[..]);
            if !bucket.is_full() {
                let inserted = bucket.insert(key, value, &self.comparator);
                drop(bucket);
                if inserted {
                    bucket_guard.mark_dirty();
                }
                return Ok(inserted);
            }
        }

        // The bucket is full; release the pins and take the split path.
        self.split_insert(tx, key, value)
    }

    /// Splits the target bucket until it has room, then inserts.
    ///
    /// Called with the table latch held exclusively and no pages pinned.
    fn split_insert(
        &self,
        _tx: Option<&Transaction>,
        key: &K,
        value: &V,
    ) -> Result<bool, IndexError> {
        let mut dir_guard = self.pool.fetch_page_mut(self.directory_page_id)?;

        loop {
            let bucket_page_id = {
                let dir = DirectoryPage::attach(&dir_guard[..]);
                dir.bucket_page_id(dir.hash_to_index(self.hash(key)))
            };

            let mut bucket_guard = self.pool.fetch_page_mut(bucket_page_id)?;
            let is_full = BucketPage::<_, K, V>::attach(&bucket_guard[..]).is_full();

            if !is_full {
                let mut bucket = BucketPage::<_, K, V>::attach(&mut bucket_guard[..]);
                let inserted = bucket.insert(key, value, &self.comparator);
                drop(bucket);
                if inserted {
                    bucket_guard.mark_dirty();
                }
                return Ok(inserted);
            }

            // A key stream that collides in the low bits can force split
            // after split without making room; the loop ends either when
            // the bucket has room or when the directory refuses to grow.
            let (slot, local_depth) = {
                let mut dir = DirectoryPage::attach(&mut dir_guard[..]);
                let slot = dir.hash_to_index(self.hash(key));
                let local_depth = dir.local_depth(slot);
                if local_depth == dir.global_depth() && !dir.incr_global_depth() {
                    return Err(IndexError::DirectoryDepthLimit);
                }
                (slot, local_depth)
            };
            dir_guard.mark_dirty();

            let mut image_guard = self.pool.new_page()?;
            let image_page_id = image_guard.page_id();

            // Redistribute: a pair moves to the split image iff the bit
            // at position `local_depth` of its hash matches the image's.
            let image_bit = 1u32 << local_depth;
            let image_slot = slot ^ image_bit as usize;
            {
                let mut bucket = BucketPage::<_, K, V>::attach(&mut bucket_guard[..]);
                let mut image = BucketPage::<_, K, V>::attach(&mut image_guard[..]);

                for i in 0..bucket.capacity() {
                    if !bucket.is_occupied(i) {
                        break;
                    }
                    if !bucket.is_readable(i) {
                        continue;
                    }
                    let k = bucket.key_at(i);
                    if self.hash(&k) & image_bit == image_slot as u32 & image_bit {
                        let v = bucket.value_at(i);
                        image.insert(&k, &v, &self.comparator);
                        bucket.remove_at(i);
                    }
                }

                bucket.log_occupancy();
                image.log_occupancy();
            }
            bucket_guard.mark_dirty();
            image_guard.mark_dirty();

            // Directory fixup. When local_depth < global_depth several
            // slots alias the split bucket; every one of them gets the
            // new depth, and the image half is redirected.
            {
                let mut dir = DirectoryPage::attach(&mut dir_guard[..]);
                let low_mask = image_bit as usize - 1;
                for s in 0..dir.size() {
                    if s & low_mask == slot & low_mask {
                        dir.set_local_depth(s, local_depth + 1);
                        if s & image_bit as usize == image_slot & image_bit as usize {
                            dir.set_bucket_page_id(s, image_page_id);
                        }
                    }
                }
            }
            dir_guard.mark_dirty();
            // Bucket pins drop here; the next iteration re-resolves the
            // key, which may now land in the image bucket.
        }
    }

    /// Removes an exact `(key, value)` pair.
    ///
    /// Returns whether a pair was removed. A bucket left empty is merged
    /// with its split image when depths allow, and the directory shrinks
    /// while it can.
    pub fn remove(&self, tx: Option<&Transaction>, key: &K, value: &V) -> Result<bool, IndexError> {
        let _latch = self.table_latch.write();

        let (removed, now_empty) = {
            let dir_guard = self.pool.fetch_page(self.directory_page_id)?;
            let dir = DirectoryPage::attach(&dir_guard[..]);
            let bucket_page_id = dir.bucket_page_id(dir.hash_to_index(self.hash(key)));
            drop(dir);

            let mut bucket_guard = self.pool.fetch_page_mut(bucket_page_id)?;
            let mut bucket = BucketPage::<_, K, V>::attach(&mut bucket_guard[..]);
            let removed = bucket.remove(key, value, &self.comparator);
            let now_empty = bucket.is_empty();
            drop(bucket);
            if removed {
                bucket_guard.mark_dirty();
            }
            (removed, now_empty)
        };

        if removed && now_empty {
            self.merge(tx, key)?;
        }
        Ok(removed)
    }

    /// Merges the (empty) bucket for `key` into its split image.
    ///
    /// Best-effort: any precondition failure leaves the table unchanged,
    /// and a skipped merge is always safe. Called with the table latch
    /// held exclusively and no pages pinned.
    fn merge(&self, _tx: Option<&Transaction>, key: &K) -> Result<(), IndexError> {
        let mut dir_guard = self.pool.fetch_page_mut(self.directory_page_id)?;

        let (slot, local_depth, bucket_page_id, image_page_id) = {
            let dir = DirectoryPage::attach(&dir_guard[..]);
            let slot = dir.hash_to_index(self.hash(key));
            let local_depth = dir.local_depth(slot);
            if local_depth == 0 {
                return Ok(());
            }

            // The merge candidate is the bucket that differs in the
            // highest distinguished bit. Unequal depths cannot merge.
            let image_slot = slot ^ (1usize << (local_depth - 1));
            if dir.local_depth(image_slot) != local_depth {
                return Ok(());
            }

            let bucket_page_id = dir.bucket_page_id(slot);
            let image_page_id = dir.bucket_page_id(image_slot);
            if bucket_page_id == image_page_id {
                return Ok(());
            }
            (slot, local_depth, bucket_page_id, image_page_id)
        };

        // Re-check emptiness while holding the directory pin; the bucket
        // may have been repopulated since the caller observed it empty.
        {
            let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
            let bucket = BucketPage::<_, K, V>::attach(&bucket_guard[..]);
            if !bucket.is_empty() {
                bucket.log_occupancy();
                return Ok(());
            }
        }

        {
            let mut dir = DirectoryPage::attach(&mut dir_guard[..]);

            // Redirect every slot of the merged prefix, not just the two
            // buddy slots: at global depth > local depth each bucket is
            // aliased by several slots and all of them must agree.
            let prefix_mask = (1usize << (local_depth - 1)) - 1;
            for s in 0..dir.size() {
                if s & prefix_mask == slot & prefix_mask {
                    dir.set_bucket_page_id(s, image_page_id);
                    dir.set_local_depth(s, local_depth - 1);
                }
            }

            while dir.can_shrink() {
                dir.decr_global_depth();
            }
        }
        dir_guard.mark_dirty();

        if !self.pool.delete_page(bucket_page_id) {
            warn!(
                "orphaned bucket page {:?} still pinned after merge",
                bucket_page_id
            );
        }
        Ok(())
    }

    /// Current global depth of the directory.
    pub fn global_depth(&self) -> Result<u32, IndexError> {
        let _latch = self.table_latch.read();
        let dir_guard = self.pool.fetch_page(self.directory_page_id)?;
        let dir = DirectoryPage::attach(&dir_guard[..]);
        Ok(dir.global_depth())
    }

    /// Checks the directory invariants and, for every bucket, that each
    /// live pair hashes to the bucket's directory prefix.
    ///
    /// # Panics
    ///
    /// Panics on any violation.
    pub fn verify_integrity(&self) -> Result<(), IndexError> {
        let _latch = self.table_latch.read();

        let dir_guard = self.pool.fetch_page(self.directory_page_id)?;
        let dir = DirectoryPage::attach(&dir_guard[..]);
        assert_eq!(
            dir.page_id(),
            self.directory_page_id,
            "directory page self-reference mismatch"
        );
        dir.verify_integrity();

        let mut checked = std::collections::HashSet::new();
        for slot in 0..dir.size() {
            let bucket_page_id = dir.bucket_page_id(slot);
            if !checked.insert(bucket_page_id) {
                continue;
            }

            let local_mask = dir.local_depth_mask(slot);
            let bucket_guard = self.pool.fetch_page(bucket_page_id)?;
            let bucket = BucketPage::<_, K, V>::attach(&bucket_guard[..]);
            for i in 0..bucket.capacity() {
                if !bucket.is_occupied(i) {
                    break;
                }
                if !bucket.is_readable(i) {
                    continue;
                }
                let key = bucket.key_at(i);
                assert_eq!(
                    self.hash(&key) & local_mask,
                    slot as u32 & local_mask,
                    "pair in bucket {:?} does not match the slot prefix",
                    bucket_page_id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPoolInstance;
    use crate::index::types::{DefaultKeyHasher, OrdComparator};
    use crate::storage::MemoryDiskManager;

    type TestIndex = ExtendibleHashIndex<i32, i32, OrdComparator, DefaultKeyHasher>;

    fn index(pool_size: usize) -> TestIndex {
        let pool = Arc::new(BufferPoolInstance::new(
            pool_size,
            Arc::new(MemoryDiskManager::new()),
            None,
        ));
        ExtendibleHashIndex::new(pool, OrdComparator, DefaultKeyHasher).unwrap()
    }

    #[test]
    fn test_new_index_is_empty() {
        let ht = index(10);
        assert_eq!(ht.global_depth().unwrap(), 0);
        assert_eq!(ht.get(None, &42).unwrap(), Vec::<i32>::new());
        ht.verify_integrity().unwrap();
    }

    #[test]
    fn test_insert_then_get() {
        let ht = index(10);

        assert!(ht.insert(None, &1, &100).unwrap());
        assert!(ht.insert(None, &2, &200).unwrap());

        assert_eq!(ht.get(None, &1).unwrap(), vec![100]);
        assert_eq!(ht.get(None, &2).unwrap(), vec![200]);
        assert_eq!(ht.get(None, &3).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_duplicate_pair_rejected_multiple_values_allowed() {
        let ht = index(10);

        assert!(ht.insert(None, &1, &100).unwrap());
        assert!(!ht.insert(None, &1, &100).unwrap());
        assert!(ht.insert(None, &1, &101).unwrap());

        let mut values = ht.get(None, &1).unwrap();
        values.sort_unstable();
        assert_eq!(values, vec![100, 101]);
    }

    #[test]
    fn test_remove() {
        let ht = index(10);

        assert!(ht.insert(None, &1, &100).unwrap());
        assert!(ht.remove(None, &1, &100).unwrap());
        assert!(!ht.remove(None, &1, &100).unwrap());
        assert_eq!(ht.get(None, &1).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_splits_grow_directory() {
        let ht = index(20);

        // Enough pairs to overflow several buckets (capacity 496 for
        // i32/i32 pairs).
        for i in 0..2000 {
            assert!(ht.insert(None, &i, &i).unwrap(), "insert {}", i);
        }
        assert!(ht.global_depth().unwrap() > 0);
        ht.verify_integrity().unwrap();

        for i in 0..2000 {
            assert_eq!(ht.get(None, &i).unwrap(), vec![i], "get {}", i);
        }
    }

    #[test]
    fn test_remove_everything_merges() {
        let ht = index(20);

        for i in 0..2000 {
            assert!(ht.insert(None, &i, &i).unwrap());
        }
        for i in 0..2000 {
            assert!(ht.remove(None, &i, &i).unwrap(), "remove {}", i);
        }
        ht.verify_integrity().unwrap();
        for i in 0..2000 {
            assert_eq!(ht.get(None, &i).unwrap(), Vec::<i32>::new());
        }
    }

    /// Hashes every key to the same 32-bit value, forcing endless
    /// collisions.
    struct CollidingHasher;

    impl KeyHasher<i32> for CollidingHasher {
        fn hash(&self, _key: &i32) -> u32 {
            0xABCD
        }
    }

    #[test]
    fn test_depth_limit_reported() {
        let pool = Arc::new(BufferPoolInstance::new(
            20,
            Arc::new(MemoryDiskManager::new()),
            None,
        ));
        let ht: ExtendibleHashIndex<i32, i32, _, _> =
            ExtendibleHashIndex::new(pool, OrdComparator, CollidingHasher).unwrap();

        // One bucket holds 496 pairs; the 497th can never find room no
        // matter how often the bucket splits.
        let capacity = crate::index::bucket_capacity(8) as i32;
        for i in 0..capacity {
            assert!(ht.insert(None, &i, &i).unwrap(), "insert {}", i);
        }
        assert!(matches!(
            ht.insert(None, &capacity, &capacity),
            Err(IndexError::DirectoryDepthLimit)
        ));

        // The failed insert changed no stored pairs.
        assert_eq!(ht.get(None, &0).unwrap(), vec![0]);
        assert_eq!(
            ht.get(None, &capacity).unwrap(),
            Vec::<i32>::new()
        );
    }

    #[test]
    fn test_transaction_handle_is_pass_through() {
        let ht = index(10);
        let tx = Transaction::new(7);
        assert!(ht.insert(Some(&tx), &1, &100).unwrap());
        assert_eq!(ht.get(Some(&tx), &1).unwrap(), vec![100]);
        assert_eq!(tx.id(), 7);
    }
}
