//! File-backed disk manager.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// File-backed disk manager.
///
/// Stores pages as contiguous 4KB blocks in a single file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (4KB)     | Page 1 (4KB)     | Page 2 (4KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 4096      ^ offset 8192
/// ```
///
/// # Concurrency
///
/// A mutex around the file handle serializes I/O. Several buffer pool
/// instances may share one disk manager, so the handle must not be seeked
/// concurrently.
///
/// # Durability
///
/// `sync()` calls `File::sync_all()` to ensure data reaches disk. Without
/// it, data may be lost on crash.
pub struct FileDiskManager {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileDiskManager {
    /// Opens or creates a storage file at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a
    /// multiple of PAGE_SIZE.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;

        // A read past the written extent comes back short; the remainder
        // of the buffer must read as zero.
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[filled..].fill(0);

        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(buf)?;

        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests as generic;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_basic_operations() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();
        generic::test_basic_operations(disk);
    }

    #[test]
    fn test_unwritten_page_reads_zero() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();
        generic::test_unwritten_page_reads_zero(disk);
    }

    #[test]
    fn test_buffer_size_validation() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();
        generic::test_buffer_size_validation(disk);
    }

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let disk = FileDiskManager::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(disk.path(), path);
    }

    #[test]
    fn test_corrupted_file_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        let result = FileDiskManager::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn test_persistence_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let disk = FileDiskManager::open(&path).unwrap();
            for i in 0..5 {
                generic::write_test_page(&disk, PageId::new(i), (i * 10) as u8);
            }
            disk.shutdown().unwrap();
        }

        {
            let disk = FileDiskManager::open(&path).unwrap();
            for i in 0..5 {
                generic::verify_test_page(&disk, PageId::new(i), (i * 10) as u8);
            }
        }
    }

    #[test]
    fn test_sparse_write_reads_zero_between() {
        let dir = tempdir().unwrap();
        let disk = FileDiskManager::open(dir.path().join("test.db")).unwrap();
        generic::write_test_page(&disk, PageId::new(4), 0x77);
        generic::verify_test_page(&disk, PageId::new(2), 0);
        generic::verify_test_page(&disk, PageId::new(4), 0x77);
    }
}
