//! File-backed block store: one file holding consecutive fixed-size blocks.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{BlockId, BlockStore};
use crate::config::validate_block_size;
use crate::error::{ArtError, Result};

/// Blocks stored in a single file. Block `n` lives at byte `n * block_size`.
pub struct FileBlockStore {
    path: PathBuf,
    block_size: usize,
    file: Mutex<File>,
    next_block: AtomicU64,
}

impl FileBlockStore {
    /// Create a new, empty store, truncating any existing file.
    pub fn create(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!(path = %path.display(), block_size, "created block file");
        Ok(Self {
            path,
            block_size,
            file: Mutex::new(file),
            next_block: AtomicU64::new(0),
        })
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>, block_size: usize) -> Result<Self> {
        validate_block_size(block_size)?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        if len % block_size as u64 != 0 {
            return Err(ArtError::Corruption(format!(
                "block file {} has length {len}, not a multiple of {block_size}",
                path.display()
            )));
        }
        let blocks = len / block_size as u64;
        debug!(path = %path.display(), block_size, blocks, "opened block file");
        Ok(Self {
            path,
            block_size,
            file: Mutex::new(file),
            next_block: AtomicU64::new(blocks),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn block_offset(&self, id: BlockId) -> Result<u64> {
        if id >= self.next_block.load(Ordering::Acquire) {
            return Err(ArtError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("block {id} was never allocated"),
            )));
        }
        Ok(id * self.block_size as u64)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(ArtError::InvalidArgument(format!(
                "buffer of {len} bytes does not match block size {}",
                self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn allocate_block(&self) -> Result<BlockId> {
        let file = self.file.lock();
        let id = self.next_block.load(Ordering::Acquire);
        file.set_len((id + 1) * self.block_size as u64)?;
        self.next_block.store(id + 1, Ordering::Release);
        Ok(id)
    }

    fn read_block(&self, id: BlockId, dst: &mut [u8]) -> Result<()> {
        self.check_len(dst.len())?;
        let offset = self.block_offset(id)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(dst)?;
        Ok(())
    }

    fn write_block(&self, id: BlockId, src: &[u8]) -> Result<()> {
        self.check_len(src.len())?;
        let offset = self.block_offset(id)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(src)?;
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.next_block.load(Ordering::Acquire)
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.blocks");

        {
            let store = FileBlockStore::create(&path, 128).unwrap();
            let id = store.allocate_block().unwrap();
            let other = store.allocate_block().unwrap();
            assert_eq!((id, other), (0, 1));
            let data = vec![0xAB; 128];
            store.write_block(other, &data).unwrap();
            store.sync().unwrap();
        }

        let store = FileBlockStore::open(&path, 128).unwrap();
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.path(), path.as_path());
        let mut out = vec![0u8; 128];
        store.read_block(1, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xAB));
        store.read_block(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unallocated_block() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBlockStore::create(dir.path().join("f"), 64).unwrap();
        let mut out = vec![0u8; 64];
        assert!(matches!(store.read_block(0, &mut out), Err(ArtError::Io(_))));
    }

    #[test]
    fn test_open_rejects_partial_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, vec![0u8; 100]).unwrap();
        assert!(matches!(
            FileBlockStore::open(&path, 64),
            Err(ArtError::Corruption(_))
        ));
    }
}
